use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

use grouplink_core::{
    ContactId, CrmGroupId, CrmRegistry, CrmStore, MembershipStatus, NewCrmGroup,
    NewPlatformGroup, PlatformGroupId, PlatformRegistry, PlatformStore, UserId,
};

fn grouplink_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("grouplink"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run grouplink");
    assert!(
        output.status.success(),
        "grouplink failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

/// A linked pair where contacts 1 and 2 (users 101 and 102) are CRM members.
fn seed_pair(home: &Path) -> (CrmGroupId, PlatformGroupId) {
    let platform = PlatformStore::open_at(home);
    let crm = CrmStore::open_at(home);
    let platform_group = platform
        .group_create(NewPlatformGroup {
            name: "Staff".to_string(),
            ..NewPlatformGroup::default()
        })
        .expect("platform group");
    let crm_group = crm
        .group_create(NewCrmGroup {
            name: "Staff".to_string(),
            title: "Staff".to_string(),
            source: format!("synced-group-{}", platform_group.id),
            ..NewCrmGroup::default()
        })
        .expect("crm group");
    for (contact, user) in [(1, 101), (2, 102)] {
        crm.identity_link(ContactId(contact), UserId(user)).expect("link");
        crm.membership_create(crm_group.id, ContactId(contact), MembershipStatus::Added)
            .expect("member");
    }
    (crm_group.id, platform_group.id)
}

fn platform_members(home: &Path, group: PlatformGroupId) -> Vec<UserId> {
    PlatformStore::open_at(home)
        .group_members(group)
        .expect("members")
}

#[test]
fn full_job_adds_missing_members_then_reports_in_sync() {
    let home = TempDir::new().expect("home");
    let (_, platform_group) = seed_pair(home.path());

    grouplink_cmd(home.path())
        .args(["job", "sync-to-platform"])
        .assert()
        .success()
        .stdout(contains("Syncing crm group"))
        .stdout(contains("Added User ID 101 to platform group"))
        .stdout(contains("Executed 'sync-to-platform' job."));
    assert_eq!(
        platform_members(home.path(), platform_group),
        vec![UserId(101), UserId(102)]
    );

    grouplink_cmd(home.path())
        .args(["job", "sync-to-platform"])
        .assert()
        .success()
        .stdout(contains("Groups are already in sync."));
}

#[test]
fn paged_steps_show_up_in_status_until_cancelled() {
    let home = TempDir::new().expect("home");
    seed_pair(home.path());

    let step = stdout_json(grouplink_cmd(home.path()).args([
        "step",
        "crm-to-platform",
        "--step-size",
        "1",
        "--json",
    ]));
    assert_eq!(step["identifier"], "manual_crm_to_platform");
    assert_eq!(step["finished"], false);
    assert_eq!(step["phase"], 0);
    assert_eq!(step["progress_from"], 0);

    let status = stdout_json(grouplink_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status["daemon"], Value::Null);
    assert_eq!(status["pairs"].as_array().map(Vec::len), Some(1));
    let jobs = status["jobs"].as_array().expect("jobs array");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["identifier"], "manual_crm_to_platform");

    grouplink_cmd(home.path())
        .args(["cancel", "to-platform"])
        .assert()
        .success()
        .stdout(contains("cancelled job 'manual_crm_to_platform'"));
    grouplink_cmd(home.path())
        .args(["cancel", "to-platform"])
        .assert()
        .success()
        .stdout(contains("is not running"));

    let status = stdout_json(grouplink_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status["jobs"].as_array().map(Vec::len), Some(0));
}

#[test]
fn batch_runs_every_step_to_completion() {
    let home = TempDir::new().expect("home");
    let (_, platform_group) = seed_pair(home.path());

    grouplink_cmd(home.path())
        .args(["batch", "crm-to-platform", "--step-size", "1"])
        .assert()
        .success()
        .stdout(contains("Phase 0: adding missing members"))
        .stdout(contains("Processing batch 2 of group members 1 to 2"))
        .stdout(contains("All done! manual_crm_to_platform"));
    assert_eq!(
        platform_members(home.path(), platform_group),
        vec![UserId(101), UserId(102)]
    );

    let status = stdout_json(grouplink_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status["jobs"].as_array().map(Vec::len), Some(0));
}

#[test]
fn settings_round_trip_through_the_cli() {
    let home = TempDir::new().expect("home");

    let defaults = stdout_json(grouplink_cmd(home.path()).args(["settings", "show", "--json"]));
    assert_eq!(defaults["interval"], "off");

    grouplink_cmd(home.path())
        .args([
            "settings",
            "set",
            "--interval",
            "hourly",
            "--direction",
            "to-crm",
            "--batch-count",
            "50",
        ])
        .assert()
        .success()
        .stdout(contains("settings.yaml"));

    let saved = stdout_json(grouplink_cmd(home.path()).args(["settings", "show", "--json"]));
    assert_eq!(saved["interval"], "hourly");
    assert_eq!(saved["direction"], "platform-to-crm");
    assert_eq!(saved["batch_count"], 50);

    grouplink_cmd(home.path())
        .args(["settings", "set", "--interval", "fortnightly"])
        .assert()
        .failure()
        .stderr(contains("unknown interval 'fortnightly'"));
    grouplink_cmd(home.path())
        .args(["settings", "set"])
        .assert()
        .failure()
        .stderr(contains("nothing to change"));
}

#[test]
fn admin_writes_propagate_through_the_live_bridge() {
    let home = TempDir::new().expect("home");
    let (crm_group, platform_group) = seed_pair(home.path());

    grouplink_cmd(home.path())
        .args(["identity", "link", "--contact", "3", "--user", "103"])
        .assert()
        .success()
        .stdout(contains("linked Contact ID 3 to User ID 103"));

    grouplink_cmd(home.path())
        .args([
            "member",
            "add",
            "--side",
            "crm",
            "--group",
            &crm_group.to_string(),
            "--member",
            "3",
        ])
        .assert()
        .success()
        .stdout(contains("added Contact ID 3 to crm group"));
    assert_eq!(platform_members(home.path(), platform_group), vec![UserId(103)]);

    grouplink_cmd(home.path())
        .args([
            "group",
            "create",
            "--side",
            "platform",
            "--name",
            "Volunteers",
            "--sync",
        ])
        .assert()
        .success()
        .stdout(contains("created platform group"))
        .stdout(contains("linked to crm group"));

    grouplink_cmd(home.path())
        .args(["group", "list"])
        .assert()
        .success()
        .stdout(contains("Volunteers"))
        .stdout(contains("Staff"));
}

#[test]
fn daemon_commands_report_when_no_daemon_runs() {
    let home = TempDir::new().expect("home");

    grouplink_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));

    let status = stdout_json(grouplink_cmd(home.path()).args(["daemon", "status", "--json"]));
    assert_eq!(status["running"], false);
}

#[test]
fn daemon_logs_tails_the_log_files() {
    use grouplink_daemon::paths::{logs_dir, stderr_log_path, stdout_log_path};

    let home = TempDir::new().expect("home");
    std::fs::create_dir_all(logs_dir(home.path())).expect("logs dir");
    std::fs::write(
        stdout_log_path(home.path()),
        "INFO first run\nINFO second run\nINFO third run\n",
    )
    .expect("daemon.log");
    std::fs::write(stderr_log_path(home.path()), "WARN registry offline\n")
        .expect("daemon-err.log");

    grouplink_cmd(home.path())
        .args(["daemon", "logs", "--lines", "2"])
        .assert()
        .success()
        .stdout(contains("second run"))
        .stdout(contains("third run"))
        .stdout(contains("first run").not())
        .stdout(contains("registry offline"));

    grouplink_cmd(home.path())
        .args(["daemon", "logs", "--stderr-only"])
        .assert()
        .success()
        .stdout(contains("registry offline"))
        .stdout(contains("third run").not());
}

#[test]
fn capabilities_follow_crm_permissions() {
    let home = TempDir::new().expect("home");
    let crm = CrmStore::open_at(home.path());
    crm.permissions_set(["access CiviCRM", "edit groups"])
        .expect("permissions");
    PlatformStore::open_at(home.path())
        .capability_create("edit_posts")
        .expect("platform capability");

    let listed = stdout_json(grouplink_cmd(home.path()).args(["capabilities", "list", "--json"]));
    assert_eq!(listed["missing"].as_array().map(Vec::len), Some(2));

    grouplink_cmd(home.path())
        .args(["capabilities", "sync"])
        .assert()
        .success()
        .stdout(contains("created capability access_civicrm"))
        .stdout(contains("created capability edit_groups"));

    crm.permissions_set(["access CiviCRM"]).expect("permissions");
    let kept = stdout_json(grouplink_cmd(home.path()).args(["capabilities", "sync", "--json"]));
    assert_eq!(kept["deleted"].as_array().map(Vec::len), Some(0));

    // The first deleting sync records what it saw; the next one prunes.
    let recorded = stdout_json(grouplink_cmd(home.path()).args([
        "capabilities",
        "sync",
        "--delete-missing",
        "--json",
    ]));
    assert_eq!(recorded["deleted"].as_array().map(Vec::len), Some(0));
    crm.permissions_set(Vec::<String>::new()).expect("permissions");
    let pruned = stdout_json(grouplink_cmd(home.path()).args([
        "capabilities",
        "sync",
        "--delete-missing",
        "--json",
    ]));
    assert_eq!(pruned["deleted"], serde_json::json!(["access_civicrm"]));

    assert_eq!(
        PlatformStore::open_at(home.path()).capabilities().expect("capabilities"),
        vec!["edit_groups".to_string(), "edit_posts".to_string()]
    );
}
