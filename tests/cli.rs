use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn launcher(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hibiscus-client").unwrap();
    cmd.current_dir(dir)
        .env_remove("HIBISCUS_LAUNCH_PROFILE")
        .env_remove("RUST_LOG")
        .env("uid", "1000")
        .env("gid", "1000");
    cmd
}

fn project_dir() -> TempDir {
    let tmp = tempfile::tempdir().unwrap();
    for sub in ["datasets", "experiments", "container/configs"] {
        std::fs::create_dir_all(tmp.path().join(sub)).unwrap();
    }
    std::fs::write(tmp.path().join("container/configs/client_1.yml"), "rounds: 3\n").unwrap();
    tmp
}

#[test]
fn missing_uid_fails_before_runtime() {
    let tmp = project_dir();
    launcher(tmp.path())
        .env_remove("uid")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("'uid' must be set"));
}

#[test]
fn empty_gid_fails_before_runtime() {
    let tmp = project_dir();
    launcher(tmp.path())
        .env("gid", "")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("'gid' must be set"));
}

#[test]
fn missing_mount_source_fails() {
    let tmp = project_dir();
    std::fs::remove_dir_all(tmp.path().join("experiments")).unwrap();

    launcher(tmp.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Mount source does not exist"))
        .stderr(predicate::str::contains("experiments"));
}

#[test]
fn dry_run_prints_stock_command() {
    let tmp = project_dir();
    let root = tmp.path().canonicalize().unwrap();
    let root = root.display();

    let expected = format!(
        "docker run --rm -t --name hibiscus-client-1 --gpus device=1 \
         -v {root}/datasets:/app/datasets \
         -v {root}/experiments:/app/experiments \
         -v {root}/container/configs:/app/configs \
         --network federated --network-alias client-1 --user 1000:1000 --shm-size 50G \
         hibiscus:app.v0.3.2 client launch-config configs/client_1.yml\n"
    );

    launcher(tmp.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn dry_run_warns_about_missing_client_config() {
    let tmp = project_dir();
    std::fs::remove_file(tmp.path().join("container/configs/client_1.yml")).unwrap();

    launcher(tmp.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stderr(predicate::str::contains("Client config not found"));
}

#[test]
fn profile_overrides_client_identity() {
    let tmp = project_dir();
    let profile = tmp.path().join("client_2.yaml");
    std::fs::write(
        &profile,
        "container_name: hibiscus-client-2\n\
         network_alias: client-2\n\
         gpu: [\"2\"]\n\
         command: [client, launch-config, configs/client_2.yml]\n\
         config_file: /app/configs/client_2.yml\n",
    )
    .unwrap();
    std::fs::write(tmp.path().join("container/configs/client_2.yml"), "rounds: 3\n").unwrap();

    launcher(tmp.path())
        .env("HIBISCUS_LAUNCH_PROFILE", &profile)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("--name hibiscus-client-2"))
        .stdout(predicate::str::contains("--gpus device=2"))
        .stdout(predicate::str::contains("--network-alias client-2"))
        .stdout(predicate::str::contains("configs/client_2.yml"));
}

#[test]
fn unreadable_profile_fails() {
    let tmp = project_dir();
    launcher(tmp.path())
        .args(["--dry-run", "--profile", "missing.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read profile"));
}
