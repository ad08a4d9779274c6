use std::io::Write;

use guildflow_core::config::AppConfig;
use guildflow_core::error::GuildflowError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[discord]
bot_token = "bot-token"

[storage]
database = "/tmp/guildflow-test/sessions.db"

[engine]
shuffle_seed = 42
member_page_size = 200
event_capacity = 64
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    let discord = config.discord.as_ref().expect("discord present");
    assert_eq!(discord.bot_token, "bot-token");
    assert_eq!(config.storage.database, "/tmp/guildflow-test/sessions.db");
    assert_eq!(
        config.database_path(),
        std::path::PathBuf::from("/tmp/guildflow-test/sessions.db")
    );
    assert_eq!(config.engine.shuffle_seed, Some(42));
    assert_eq!(config.engine.member_page_size, 200);
    assert_eq!(config.engine.event_capacity, 64);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("GUILDFLOW_TEST_BOT_TOKEN", "expanded-token");

    let toml_content = r#"
[discord]
bot_token = "${GUILDFLOW_TEST_BOT_TOKEN}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.discord.unwrap().bot_token, "expanded-token");

    std::env::remove_var("GUILDFLOW_TEST_BOT_TOKEN");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"# nothing configured\n").expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert!(config.discord.is_none());
    assert_eq!(config.storage.database, "~/.guildflow/guildflow.db");
    assert!(config.engine.shuffle_seed.is_none());
    assert_eq!(config.engine.member_page_size, 1000);
    assert_eq!(config.engine.event_capacity, 256);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("absent.toml");

    assert!(matches!(
        AppConfig::load(&path),
        Err(GuildflowError::ConfigNotFound(_))
    ));
    let config = AppConfig::load_or_default(&path).expect("defaults");
    assert!(config.discord.is_none());
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        "[discord]\nbot_token = \"  \"\n",
        "[engine]\nmember_page_size = 0\n",
        "[engine]\nevent_capacity = 0\n",
        "[engine]\nmember_page_size = \"many\"\n",
    ];
    for content in cases {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(content.as_bytes()).expect("write toml");
        assert!(
            matches!(AppConfig::load(tmp.path()), Err(GuildflowError::Config(_))),
            "accepted: {}",
            content
        );
    }
}
