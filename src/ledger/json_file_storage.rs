// JSON data-file persistence: the whole ledger is rewritten on every mutation.
use crate::{
    host::UserId,
    ledger::storage::{
        Counts,
        LedgerStorage,
    },
};
use anyhow::Context;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs::{
        self,
        File,
    },
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const LEDGER_FILE: &str = "mystery_box.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredData {
    #[serde(default)]
    players: Counts,
}

#[derive(Debug)]
pub struct JsonFileLedgerStorage {
    path: PathBuf,
}

impl JsonFileLedgerStorage {
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create ledger directory {}", parent.display())
            })?;
        }
        Ok(Self { path })
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> crate::Result<Self> {
        Self::open(dir.as_ref().join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, data: &StoredData) -> crate::Result<()> {
        let json =
            serde_json::to_vec_pretty(data).context("Failed to serialize ledger data")?;
        let staging = self.path.with_extension("json.tmp");
        let mut file = File::create(&staging).with_context(|| {
            format!("Failed to create ledger staging file {}", staging.display())
        })?;
        file.write_all(&json)
            .and_then(|()| file.sync_all())
            .with_context(|| {
                format!("Failed to write ledger staging file {}", staging.display())
            })?;
        fs::rename(&staging, &self.path).with_context(|| {
            format!("Failed to replace ledger file {}", self.path.display())
        })?;
        Ok(())
    }
}

impl LedgerStorage for JsonFileLedgerStorage {
    fn load(&self) -> crate::Result<Counts> {
        if !self.path.exists() {
            return Ok(Counts::new());
        }
        let data = fs::read(&self.path).with_context(|| {
            format!("Failed to read ledger file {}", self.path.display())
        })?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Counts::new());
        }
        let stored: StoredData = serde_json::from_slice(&data).with_context(|| {
            format!("Failed to parse ledger file {}", self.path.display())
        })?;
        Ok(stored.players)
    }

    fn store(&mut self, _changed: UserId, counts: &Counts) -> crate::Result<()> {
        self.write(&StoredData {
            players: counts.clone(),
        })
    }

    fn clear(&mut self) -> crate::Result<()> {
        self.write(&StoredData::default())
    }
}
