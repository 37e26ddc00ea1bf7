//! 🔧 App Configuration: the TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer, 3am) 🦆
//!
//! 🏗️ Powered by Figment. `DIX_*` environment variables are the base layer, an optional
//! TOML file goes on top. Every knob has a serde default, so an empty file (or no file)
//! is a valid config: in-memory store, sensible limits.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::stores::StoreConfig;

/// 📦 Everything dix needs to know about itself.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// 🗄️ `[store.Sqlite]` or `[store.InMemory]`
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🎛️ The knobs that shape a run.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 📄 an entity fails once more rows than this could not even be parsed
    #[serde(default = "default_max_parse_errors")]
    pub max_parse_errors: usize,
    /// 🧾 parse errors listed per entity in the report. validation errors are always listed in full
    #[serde(default = "default_max_reported_parse_errors", alias = "max_reported_errors")]
    pub max_reported_parse_errors: usize,
    /// 🔁 re-plan + re-apply attempts after a failed transaction
    #[serde(default = "default_transaction_retries", alias = "retries")]
    pub transaction_retries: u32,
    /// ⏱️ run deadline; once passed, no new entity starts. `None` = no deadline
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// 🔒 how long to wait for another import of the same partition to finish
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

// 📄 25 unparseable rows and we stop believing the rest of the file is what it claims to be.
fn default_max_parse_errors() -> usize {
    25
}

// 🧾 nobody reads past the first hundred garbled lines. the count tells them how many more there were.
fn default_max_reported_parse_errors() -> usize {
    100
}

fn default_transaction_retries() -> u32 {
    1
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parse_errors: default_max_parse_errors(),
            max_reported_parse_errors: default_max_reported_parse_errors(),
            transaction_retries: default_transaction_retries(),
            timeout_ms: None,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// 🚀 Load the config from `DIX_*` env vars, plus the TOML file if one was given.
///
/// 📐 DESIGN NOTE:
///   - `config_file_name` None  → env vars only (and defaults). No implicit `dix.toml`.
///   - `config_file_name` Some  → env vars + TOML, merged. TOML wins on conflicts.
///   - nested keys from env use a double underscore: `DIX_RUNTIME__MAX_PARSE_ERRORS=50`
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("DIX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (DIX_*). \
             Check the section names: [store.Sqlite], [store.InMemory], [runtime].",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (DIX_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_sqlite_and_runtime_knobs_all_show_up() {
        let file = write_test_config(
            r#"
            [store.Sqlite]
            path = "/tmp/dix-test.sqlite3"

            [runtime]
            max_parse_errors = 3
            transaction_retries = 0
            timeout_ms = 1500
            "#,
        );

        let app_config = load_config(Some(file.path()))
            .expect("💀 Config should parse. The schema drift goblin does not get this win.");

        match &app_config.store {
            StoreConfig::Sqlite(sqlite) => {
                assert_eq!(sqlite.path, Path::new("/tmp/dix-test.sqlite3"));
                assert_eq!(sqlite.busy_timeout_ms, 5_000);
            }
            honestly_who_knows => panic!(
                "💀 Expected a Sqlite store config, but serde took us to {honestly_who_knows:?}."
            ),
        }
        assert_eq!(app_config.runtime.max_parse_errors, 3);
        assert_eq!(app_config.runtime.transaction_retries, 0);
        assert_eq!(app_config.runtime.timeout_ms, Some(1500));
        assert_eq!(app_config.runtime.max_reported_parse_errors, 100);
        assert_eq!(app_config.runtime.lock_timeout_ms, 30_000);
    }

    #[test]
    fn the_one_where_an_empty_file_is_a_perfectly_good_config() {
        let file = write_test_config("");
        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(file.path()))
            .extract()
            .expect("💀 Defaults should cover everything.");
        assert!(matches!(app_config.store, StoreConfig::InMemory(_)));
        assert_eq!(app_config.runtime, RuntimeConfig::default());
    }

    #[test]
    fn the_one_where_the_in_memory_table_parses_too() {
        let file = write_test_config(
            r#"
            [store.InMemory]

            [runtime]
            retries = 4
            "#,
        );
        let app_config = load_config(Some(file.path())).expect("💀 InMemory table should parse.");
        assert!(matches!(app_config.store, StoreConfig::InMemory(_)));
        assert_eq!(app_config.runtime.transaction_retries, 4);
    }

    #[test]
    fn the_one_where_a_typo_in_the_store_name_is_loud() {
        let file = write_test_config(
            r#"
            [store.Postgres]
            url = "postgres://nope"
            "#,
        );
        let err = load_config(Some(file.path())).expect_err("💀 unknown store must fail");
        assert!(format!("{err:#}").contains("DIX_"));
    }

    #[test]
    fn the_one_where_the_old_error_cap_name_still_means_parse_errors() {
        let mut runtime = toml::Table::new();
        runtime.insert("max_reported_errors".into(), toml::Value::Integer(7));
        runtime.insert("lock_timeout_ms".into(), toml::Value::Integer(250));
        let mut root = toml::Table::new();
        root.insert("runtime".into(), toml::Value::Table(runtime));
        let rendered = toml::to_string(&root).expect("💀 a toml table should render");

        // -- straight through serde, no figment in between
        let direct: AppConfig = toml::from_str(&rendered).expect("💀 toml should deserialize directly");
        assert_eq!(direct.runtime.max_reported_parse_errors, 7);
        assert_eq!(direct.runtime.lock_timeout_ms, 250);
        assert_eq!(direct.runtime.max_parse_errors, 25);

        // -- and through load_config, which must agree
        let file = write_test_config(&rendered);
        let loaded = load_config(Some(file.path())).expect("💀 rendered toml should load");
        assert_eq!(loaded.runtime, direct.runtime);
    }
}
