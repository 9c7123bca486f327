//! CLI-level tests: command surface and the exit code contract.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn keepsake(temp: &TempDir) -> Result<Command> {
    let mut cmd = Command::cargo_bin("keepsake")?;
    cmd.env("KEEPSAKE_CONFIG_PATH", temp.path().join("config.toml"))
        .env("KEEPSAKE_ARCHIVE_DIR", temp.path().join("archives"))
        .env("KEEPSAKE_STATE_DIR", temp.path().join("state"));
    Ok(cmd)
}

#[test]
fn test_backup_and_list() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().join("root");
    fs::create_dir_all(&root)?;
    fs::write(root.join("a.txt"), "hello")?;

    keepsake(&temp)?
        .args(["backup", "steam", "--root"])
        .arg(&root)
        .assert()
        .success()
        .stderr(predicate::str::contains("Backed up 'steam'"));

    keepsake(&temp)?
        .args(["list", "steam"])
        .assert()
        .success()
        .stdout(predicate::str::contains("steam"))
        .stdout(predicate::str::contains("full"));

    Ok(())
}

#[test]
fn test_noop_backup_reports_no_changes() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().join("root");
    fs::create_dir_all(&root)?;
    fs::write(root.join("a.txt"), "hello")?;

    keepsake(&temp)?
        .args(["backup", "steam", "--root"])
        .arg(&root)
        .assert()
        .success();

    keepsake(&temp)?
        .args(["backup", "steam", "--root"])
        .arg(&root)
        .assert()
        .success()
        .stderr(predicate::str::contains("No changes detected"));

    Ok(())
}

#[test]
fn test_backup_missing_root_exits_with_access_code() -> Result<()> {
    let temp = TempDir::new()?;

    keepsake(&temp)?
        .args(["backup", "steam", "--root"])
        .arg(temp.path().join("does-not-exist"))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("cannot access"));

    Ok(())
}

#[test]
fn test_backup_unconfigured_set_without_root_fails() -> Result<()> {
    let temp = TempDir::new()?;

    keepsake(&temp)?
        .args(["backup", "steam"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not configured"));

    Ok(())
}

#[test]
fn test_backup_restore_cycle() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().join("root");
    fs::create_dir_all(root.join("sub"))?;
    fs::write(root.join("a.txt"), "alpha")?;
    fs::write(root.join("sub/b.txt"), "beta")?;

    keepsake(&temp)?
        .args(["backup", "steam", "--root"])
        .arg(&root)
        .assert()
        .success();

    let target = temp.path().join("target");
    keepsake(&temp)?
        .args(["restore", "steam"])
        .arg(&target)
        .assert()
        .success()
        .stderr(predicate::str::contains("Restored 'steam'"));

    assert_eq!(fs::read(target.join("a.txt"))?, b"alpha");
    assert_eq!(fs::read(target.join("sub/b.txt"))?, b"beta");
    Ok(())
}

#[test]
fn test_restore_unknown_set_fails() -> Result<()> {
    let temp = TempDir::new()?;

    keepsake(&temp)?
        .args(["restore", "ghost"])
        .arg(temp.path().join("target"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no archives found"));

    Ok(())
}

#[test]
fn test_verify_reports_intact_chain() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().join("root");
    fs::create_dir_all(&root)?;
    fs::write(root.join("a.txt"), "hello")?;

    keepsake(&temp)?
        .args(["backup", "steam", "--root"])
        .arg(&root)
        .assert()
        .success();

    keepsake(&temp)?
        .args(["verify", "steam"])
        .assert()
        .success()
        .stderr(predicate::str::contains("1 archive(s) intact"));

    Ok(())
}

#[test]
fn test_verify_corrupt_archive_exits_with_archive_code() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().join("root");
    fs::create_dir_all(&root)?;
    fs::write(root.join("a.txt"), "hello")?;

    keepsake(&temp)?
        .args(["backup", "steam", "--root"])
        .arg(&root)
        .assert()
        .success();

    // Flip a byte in the middle of the only archive
    let set_dir = temp.path().join("archives").join("steam");
    let archive = fs::read_dir(&set_dir)?
        .filter_map(std::result::Result::ok)
        .find(|e| e.path().extension().and_then(|s| s.to_str()) == Some("kpa"))
        .expect("archive written")
        .path();
    let mut bytes = fs::read(&archive)?;
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    fs::write(&archive, bytes)?;

    keepsake(&temp)?
        .args(["verify", "steam"])
        .assert()
        .failure()
        .code(5)
        .stderr(predicate::str::contains("failed verification"));

    Ok(())
}

#[test]
fn test_quiet_suppresses_success_output() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().join("root");
    fs::create_dir_all(&root)?;
    fs::write(root.join("a.txt"), "hello")?;

    keepsake(&temp)?
        .args(["--quiet", "backup", "steam", "--root"])
        .arg(&root)
        .assert()
        .success()
        .stderr(predicate::str::is_empty());

    Ok(())
}

#[test]
fn test_completion_generation() -> Result<()> {
    let temp = TempDir::new()?;

    keepsake(&temp)?
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("keepsake"));

    Ok(())
}
