// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use serial_test::serial;

use super::*;

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

#[test]
fn defaults() -> anyhow::Result<()> {
    let config = parse(&["oauthman", "--state-dir", "/tmp/om"]);
    config.validate()?;
    assert_eq!(config.mode(), Mode::Run);
    assert_eq!(config.redirect_timeout(), Duration::from_secs(300));
    assert!(!config.generate_state);
    assert_eq!(config.token_dir(), PathBuf::from("/tmp/om/google"));
    assert_eq!(config.clients_path(), PathBuf::from("/tmp/om/clients.json"));
    Ok(())
}

#[test]
fn status_subcommand_accepts_global_flags() -> anyhow::Result<()> {
    let config = parse(&["oauthman", "status", "--clients", "/etc/clients.json"]);
    config.validate()?;
    assert_eq!(config.mode(), Mode::Status);
    assert_eq!(config.clients_path(), PathBuf::from("/etc/clients.json"));
    Ok(())
}

#[yare::parameterized(
    zero_timeout = { &["oauthman", "--redirect-timeout-secs", "0"], "greater than zero" },
    bad_format   = { &["oauthman", "--log-format", "yaml"], "invalid log format" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
#[serial]
fn state_dir_falls_back_to_home() {
    let saved = std::env::var("HOME").ok();
    std::env::set_var("HOME", "/home/someone");
    let config = parse(&["oauthman"]);
    let dir = config.state_dir();
    match saved {
        Some(h) => std::env::set_var("HOME", h),
        None => std::env::remove_var("HOME"),
    }
    assert_eq!(dir, PathBuf::from("/home/someone/.oauthman"));
}

#[test]
#[serial]
fn state_dir_from_env() {
    std::env::set_var("OAUTHMAN_STATE_DIR", "/var/lib/om");
    let config = parse(&["oauthman"]);
    std::env::remove_var("OAUTHMAN_STATE_DIR");
    assert_eq!(config.state_dir(), PathBuf::from("/var/lib/om"));
}

#[test]
fn load_clients_keeps_order_and_aliases() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("clients.json");
    std::fs::write(
        &path,
        r#"{
            "work": {
                "client_id": "cid-work",
                "client_secret": "sec",
                "redirect_uri": "http://localhost:8085/callback",
                "scope": ["email", "profile"],
                "token_endpoint": "http://127.0.0.1:9000/token"
            },
            "home": { "id": "cid-home", "secret": "s2", "redirect_uri": "http://localhost:8086/" }
        }"#,
    )?;

    let accounts = load_clients(&path)?;
    let names: Vec<&str> = accounts.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["work", "home"]);

    let work = &accounts["work"];
    let profile = work.profile();
    assert_eq!(profile.scope, vec!["email".to_owned(), "profile".to_owned()]);
    assert_eq!(profile.token_endpoint, "http://127.0.0.1:9000/token");
    assert_eq!(profile.authorization_endpoint, ProviderProfile::google().authorization_endpoint);

    let home = &accounts["home"];
    assert_eq!(home.client_config().client_id, "cid-home");
    assert_eq!(home.profile(), ProviderProfile::google());
    Ok(())
}

#[yare::parameterized(
    traversal = { r#"{"../x": {"client_id": "a", "client_secret": "b", "redirect_uri": "c"}}"#, "invalid account name" },
    missing   = { r#"{"w": {"client_id": "a", "redirect_uri": "c"}}"#, "client_secret" },
    not_json  = { "nope", "parse clients file" },
)]
fn load_clients_rejects(contents: &str, expected_substr: &str) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("clients.json");
    std::fs::write(&path, contents).expect("write");
    crate::assert_err_contains!(load_clients(&path), expected_substr);
}

#[test]
fn load_clients_missing_file() {
    crate::assert_err_contains!(
        load_clients(Path::new("/nonexistent/clients.json")),
        "read clients file"
    );
}
