use crate::{
    Result,
    catalog::RewardDefinition,
};
use anyhow::{
    Context,
    ensure,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::Path,
    time::Duration,
};

pub const CONFIG_FILE: &str = "mystery_box.config.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub wipe_on_new_save: bool,
    pub spin: SpinConfig,
    pub seed: Option<u64>,
    pub rewards: Vec<RewardDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wipe_on_new_save: true,
            spin: SpinConfig::default(),
            seed: None,
            rewards: default_rewards(),
        }
    }
}

fn default_rewards() -> Vec<RewardDefinition> {
    vec![
        RewardDefinition::new("scrap", 50, 250),
        RewardDefinition::new("metal.fragments", 500, 2000),
        RewardDefinition::new("metal.refined", 20, 100),
        RewardDefinition::new("ammo.rifle", 64, 256),
        RewardDefinition::new("syringe.medical", 2, 6),
        RewardDefinition::new("rifle.ak", 1, 1),
        RewardDefinition::new("supply.signal", 1, 1),
        RewardDefinition::new("explosive.timed", 1, 3).hidden(),
    ]
}

/// Cadence of the randomisation sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinConfig {
    pub max_ticks: u32,
    pub initial_delay_ms: u64,
    pub tick_interval_ms: u64,
    pub slowdown_after_ticks: u32,
    pub slowdown_step_ms: u64,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            max_ticks: 20,
            initial_delay_ms: 200,
            tick_interval_ms: 200,
            slowdown_after_ticks: 15,
            slowdown_step_ms: 50,
        }
    }
}

impl SpinConfig {
    /// Constant cadence with no slowdown.
    pub fn steady(max_ticks: u32, interval_ms: u64) -> Self {
        Self {
            max_ticks,
            initial_delay_ms: interval_ms,
            tick_interval_ms: interval_ms,
            slowdown_after_ticks: max_ticks,
            slowdown_step_ms: 0,
        }
    }

    /// Wait before tick number `completed + 1`, given `completed` ticks so far.
    ///
    /// Never decreases as `completed` grows; the first wait is capped at the
    /// steady interval.
    pub fn delay_before(&self, completed: u32) -> Duration {
        if completed == 0 {
            return Duration::from_millis(self.initial_delay_ms.min(self.tick_interval_ms));
        }
        let slowed = u64::from(completed.saturating_sub(self.slowdown_after_ticks));
        let extra = self.slowdown_step_ms.saturating_mul(slowed);
        Duration::from_millis(self.tick_interval_ms.saturating_add(extra))
    }

    /// Time from open until the sequence settles.
    pub fn total_duration(&self) -> Duration {
        (0..self.max_ticks).map(|completed| self.delay_before(completed)).sum()
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.spin.max_ticks > 0, "spin.max_ticks must be positive");
        for reward in &self.rewards {
            ensure!(
                !reward.shortname.trim().is_empty(),
                "reward shortname must not be empty"
            );
            ensure!(
                reward.min_amount <= reward.max_amount,
                "reward {} has min_amount {} above max_amount {}",
                reward.shortname,
                reward.min_amount,
                reward.max_amount
            );
        }
        Ok(())
    }

    /// Read the config at `path`, writing the defaults there if it is missing.
    ///
    /// A file that cannot be parsed is left untouched and the defaults are
    /// used for this session.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            tracing::info!("New config created at {}", path.display());
            return Ok(config);
        }
        let data = fs::read(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = match serde_json::from_slice::<Self>(&data) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Invalid config {}, using default config: {e}",
                    path.display()
                );
                return Ok(Self::default());
            }
        };
        config
            .validate()
            .with_context(|| format!("Invalid config values in {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn delay_before__is_monotonic_non_decreasing() {
        let spin = SpinConfig::default();
        let delays: Vec<Duration> = (0..spin.max_ticks + 5)
            .map(|completed| spin.delay_before(completed))
            .collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[17], Duration::from_millis(300));
    }

    #[test]
    fn total_duration__steady_cadence__is_ticks_times_interval() {
        let spin = SpinConfig::steady(20, 200);
        assert_eq!(spin.total_duration(), Duration::from_millis(4000));
    }

    #[test]
    fn load_or_init__missing_file__writes_defaults() {
        // given
        let temp_dir = TempDir::new("config_missing").unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);

        // when
        let config = Config::load_or_init(&path).unwrap();

        // then
        assert_eq!(config, Config::default());
        assert!(path.exists());
        assert_eq!(Config::load_or_init(&path).unwrap(), config);
    }

    #[test]
    fn load_or_init__unparsable_file__falls_back_without_overwriting() {
        // given
        let temp_dir = TempDir::new("config_invalid").unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, b"{ definitely not json").unwrap();

        // when
        let config = Config::load_or_init(&path).unwrap();

        // then
        assert_eq!(config, Config::default());
        assert_eq!(fs::read(&path).unwrap(), b"{ definitely not json");
    }

    #[test]
    fn load_or_init__partial_file__fills_in_defaults() {
        // given
        let temp_dir = TempDir::new("config_partial").unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            br#"{"wipe_on_new_save":false,"spin":{"max_ticks":5},"rewards":[{"shortname":"wood","min_amount":1,"max_amount":9}]}"#,
        )
        .unwrap();

        // when
        let config = Config::load_or_init(&path).unwrap();

        // then
        assert!(!config.wipe_on_new_save);
        assert_eq!(config.spin.max_ticks, 5);
        assert_eq!(config.spin.tick_interval_ms, 200);
        assert_eq!(config.rewards, vec![RewardDefinition::new("wood", 1, 9)]);
    }

    #[test]
    fn validate__inverted_range__is_rejected() {
        let config = Config {
            rewards: vec![RewardDefinition::new("scrap", 10, 5)],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
