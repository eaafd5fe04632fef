use pretty_assertions::assert_eq;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const SECRET: &str = "keystore-secret";
const SEED: &str = "seed-key";

const KEY_MAP: &str = r#"{
    "test-key-1": {"n": 1, "v": "test-key-1-value"},
    "test-key-2": {"n": 2, "v": "test-key-2-value-new", "o": "test-key-2-value"}
}"#;

fn keyservice() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_keyservice"));
    for var in [
        "KEYSERVICE_KEYSTORE",
        "KEYSERVICE_SECRET",
        "KEYSERVICE_SEED_KEY",
        "KEYSERVICE_CACHE_TTL_MS",
        "KEYSERVICE_CACHE_DIR",
        "KEYSERVICE_CACHE_NAMESPACE",
        "KEYSERVICE_CACHE_BACKGROUND",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "error");
    cmd
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn sealed_keystore(dir: &tempfile::TempDir) -> PathBuf {
    let source = dir.path().join("keys.json");
    let keystore = dir.path().join("keys.store");
    fs::write(&source, KEY_MAP).unwrap();

    let output = keyservice()
        .arg("seal")
        .arg("--source")
        .arg(&source)
        .arg("--keystore")
        .arg(&keystore)
        .args(["--secret", SECRET])
        .output()
        .unwrap();
    stdout(&output);
    keystore
}

fn with_service(cmd: &mut Command, keystore: &Path, key: &str) {
    cmd.arg("--keystore")
        .arg(keystore)
        .args(["--secret", SECRET, "--seed-key", SEED, "--key", key]);
}

fn encrypt(keystore: &Path, key: &str, value: &str) -> String {
    let mut cmd = keyservice();
    cmd.arg("encrypt");
    with_service(&mut cmd, keystore, key);
    let output = cmd.arg(value).output().unwrap();
    stdout(&output).trim_end().to_string()
}

#[test]
fn seal_writes_a_readable_keystore() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = sealed_keystore(&dir);

    let contents = fs::read_to_string(&keystore).unwrap();
    assert!(!contents.contains("test-key-1-value"));
    assert!(!contents.contains('='));
}

#[test]
fn encrypt_then_decrypt() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = sealed_keystore(&dir);
    let payload = encrypt(&keystore, "test-key-2", "hello world");

    let mut cmd = keyservice();
    cmd.arg("decrypt");
    with_service(&mut cmd, &keystore, "test-key-2");
    let output = cmd.arg(&payload).output().unwrap();

    assert_eq!(stdout(&output), "hello world\n");
}

#[test]
fn secrets_can_come_from_the_environment() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = sealed_keystore(&dir);
    let payload = encrypt(&keystore, "test-key-1", "from env");

    let output = keyservice()
        .env("KEYSERVICE_KEYSTORE", &keystore)
        .env("KEYSERVICE_SECRET", SECRET)
        .env("KEYSERVICE_SEED_KEY", SEED)
        .args(["decrypt", "--key", "test-key-1"])
        .arg(&payload)
        .output()
        .unwrap();

    assert_eq!(stdout(&output), "from env\n");
}

#[test]
fn decrypt_embedded_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = sealed_keystore(&dir);
    let payload = encrypt(&keystore, "test-key-1", "hello");

    let mut cmd = keyservice();
    cmd.arg("decrypt-embedded");
    with_service(&mut cmd, &keystore, "test-key-1");
    let mut child = cmd
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    write!(
        child.stdin.take().unwrap(),
        r#"{{"a":"$${payload}$$","b":"$${payload}$$"}}"#
    )
    .unwrap();
    let output = child.wait_with_output().unwrap();

    assert_eq!(stdout(&output), r#"{"a":"hello","b":"hello"}"#);
}

#[test]
fn decrypt_embedded_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = sealed_keystore(&dir);
    let payload = encrypt(&keystore, "test-key-2", "s3cr3t");
    let config = dir.path().join("app.conf");
    fs::write(&config, format!("password = $${payload}$$\n")).unwrap();

    let mut cmd = keyservice();
    cmd.arg("decrypt-embedded");
    with_service(&mut cmd, &keystore, "test-key-2");
    let output = cmd.arg(&config).output().unwrap();

    assert_eq!(stdout(&output), "password = s3cr3t\n");
}

#[test]
fn foreign_seed_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = sealed_keystore(&dir);
    let payload = encrypt(&keystore, "test-key-1", "hello");

    let output = keyservice()
        .arg("decrypt")
        .arg("--keystore")
        .arg(&keystore)
        .args(["--secret", SECRET, "--seed-key", "other-seed", "--key", "test-key-1"])
        .arg(&payload)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("signature error"));
}

#[test]
fn unknown_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = sealed_keystore(&dir);

    let mut cmd = keyservice();
    cmd.arg("encrypt");
    with_service(&mut cmd, &keystore, "no-such-key");
    let output = cmd.arg("hello").output().unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn wrong_keystore_secret_fails() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = sealed_keystore(&dir);

    let output = keyservice()
        .arg("encrypt")
        .arg("--keystore")
        .arg(&keystore)
        .args(["--secret", "wrong", "--seed-key", SEED, "--key", "test-key-1", "hello"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot open key store"));
}

#[test]
fn seal_rejects_invalid_key_map() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("keys.json");
    let keystore = dir.path().join("keys.store");
    fs::write(&source, "[1, 2, 3]").unwrap();

    let output = keyservice()
        .arg("seal")
        .arg("--source")
        .arg(&source)
        .arg("--keystore")
        .arg(&keystore)
        .args(["--secret", SECRET])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(!keystore.exists());
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}

#[test]
fn disk_cache_entry_is_written_before_exit() {
    let dir = tempfile::tempdir().unwrap();
    let keystore = sealed_keystore(&dir);
    let payload = encrypt(&keystore, "test-key-1", "cached");
    let cache_dir = tempfile::tempdir().unwrap();

    let mut cmd = keyservice();
    cmd.arg("decrypt").arg("--disk-cache");
    with_service(&mut cmd, &keystore, "test-key-1");
    let output = cmd
        .env("KEYSERVICE_CACHE_DIR", cache_dir.path())
        .arg(&payload)
        .output()
        .unwrap();

    assert_eq!(stdout(&output), "cached\n");
    assert_eq!(files_under(cache_dir.path()).len(), 1);
}
