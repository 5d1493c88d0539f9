//! Integration tests against scripted stand-ins for the transfer tool.
#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use vaultmove_core::{IgnoreRuleSet, Outcome, ProgressEvent, VerifyResult};
use vaultmove_remote::{
    RemoteError, TransferOptions, TransferRunner, TransferTool, Verifier,
};

/// A tool that runs `body` as a shell script with the subcommand in `$1`.
fn fake_tool(dir: &TempDir, body: &str) -> TransferTool {
    let script = dir.path().join("fake-tool.sh");
    std::fs::write(&script, body).unwrap();
    TransferTool::new("sh").with_global_args(vec![script.to_string_lossy().into_owned()])
}

fn runner(tool: TransferTool) -> TransferRunner {
    TransferRunner::new(tool, TransferOptions::default())
}

async fn run_copy(
    runner: &TransferRunner,
    folder: &Path,
    rules: &IgnoreRuleSet,
) -> (Outcome, Vec<ProgressEvent>) {
    let mut events = Vec::new();
    let outcome = runner
        .transfer(folder, "remote:dest", rules, &CancellationToken::new(), |e| {
            events.push(e)
        })
        .await;
    (outcome, events)
}

#[tokio::test]
async fn test_transfer_success_reports_progress() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(
        &dir,
        r#"
echo "INFO  : a.txt: Copied (new)"
echo "Transferred: 1 MiB / 2 MiB, 50%, 1.000 MiB/s, ETA 1s" >&2
echo "Transferred: 2 MiB / 2 MiB, 100%, 1.000 MiB/s, ETA 0s" >&2
exit 0
"#,
    );

    let (outcome, events) = run_copy(&runner(tool), dir.path(), &IgnoreRuleSet::empty()).await;

    assert_eq!(outcome, Outcome::Success);
    assert!(events.contains(&ProgressEvent::raw("INFO  : a.txt: Copied (new)")));
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Percent { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, [50, 100]);
}

#[tokio::test]
async fn test_transfer_failure_carries_diagnostics() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(
        &dir,
        r#"
echo "ERROR : Attempt 1/3 failed" >&2
echo "Failed to copy: directory not found" >&2
exit 1
"#,
    );

    let (outcome, _) = run_copy(&runner(tool), dir.path(), &IgnoreRuleSet::empty()).await;

    let message = outcome.message().unwrap();
    assert!(message.contains("exit code 1"), "{message}");
    assert!(message.contains("directory not found"), "{message}");
}

#[tokio::test]
async fn test_transfer_failure_without_output() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(&dir, "exit 3\n");

    let (outcome, events) = run_copy(&runner(tool), dir.path(), &IgnoreRuleSet::empty()).await;

    assert_eq!(outcome, Outcome::failure("transfer tool exited with exit code 3"));
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_both_pipes_drained_under_load() {
    let dir = TempDir::new().unwrap();
    // Far more than one pipe buffer on each stream.
    let tool = fake_tool(
        &dir,
        r#"
i=0
while [ $i -lt 20000 ]; do
  echo "diagnostic line number $i" >&2
  echo "output line number $i"
  i=$((i+1))
done
exit 0
"#,
    );

    let (outcome, events) = tokio::time::timeout(
        Duration::from_secs(60),
        run_copy(&runner(tool), dir.path(), &IgnoreRuleSet::empty()),
    )
    .await
    .expect("transfer must not deadlock on full pipes");

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(events.len(), 40000);
}

#[tokio::test]
async fn test_invalid_utf8_output_is_tolerated() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(&dir, "printf 'bad \\377 byte\\n' >&2\nexit 0\n");

    let (outcome, events) = run_copy(&runner(tool), dir.path(), &IgnoreRuleSet::empty()).await;

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_ignore_rules_passed_as_exclude_file() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(
        &dir,
        r#"
prev=""
for arg in "$@"; do
  if [ "$prev" = "--exclude-from" ]; then cat "$arg"; fi
  prev="$arg"
done
exit 0
"#,
    );
    let rules = IgnoreRuleSet::new(["*.tmp", "node_modules/"]).unwrap();

    let (outcome, events) = run_copy(&runner(tool), dir.path(), &rules).await;

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(
        events,
        [
            ProgressEvent::raw("*.tmp"),
            ProgressEvent::raw("node_modules/")
        ]
    );
}

#[tokio::test]
async fn test_no_exclude_flag_without_rules() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(
        &dir,
        r#"
for arg in "$@"; do
  if [ "$arg" = "--exclude-from" ]; then exit 9; fi
done
exit 0
"#,
    );

    let (outcome, _) = run_copy(&runner(tool), dir.path(), &IgnoreRuleSet::empty()).await;
    assert_eq!(outcome, Outcome::Success);
}

#[tokio::test]
async fn test_cancellation_kills_transfer() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(&dir, "echo started >&2\nexec sleep 30\n");
    let runner = runner(tool);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let outcome = runner
        .transfer(dir.path(), "remote:dest", &IgnoreRuleSet::empty(), &cancel, |_| {})
        .await;

    assert_eq!(outcome, Outcome::failure("transfer cancelled"));
    assert!(start.elapsed() < Duration::from_secs(10));
}

const VERIFY_SCRIPT: &str = r#"
case "$1" in
  size) echo '{"count":3,"bytes":1536,"sizeless":0}' ;;
  check) echo "NOTICE: 0 differences found" >&2; exit 0 ;;
esac
"#;

#[tokio::test]
async fn test_verify_passes() {
    let dir = TempDir::new().unwrap();
    let verifier = Verifier::new(fake_tool(&dir, VERIFY_SCRIPT));

    let result = verifier
        .verify(dir.path(), "remote:dest", &CancellationToken::new())
        .await;

    assert_eq!(
        result,
        VerifyResult::Verified {
            remote_files: 3,
            remote_bytes: 1536
        }
    );
}

#[tokio::test]
async fn test_verify_mismatch() {
    let dir = TempDir::new().unwrap();
    let verifier = Verifier::new(fake_tool(
        &dir,
        r#"
case "$1" in
  size) echo '{"count":2,"bytes":10}' ;;
  check) echo "ERROR : b.txt: file not in remote" >&2; echo "ERROR : 1 differences found" >&2; exit 1 ;;
esac
"#,
    ));

    let result = verifier
        .verify(dir.path(), "remote:dest", &CancellationToken::new())
        .await;

    match result {
        VerifyResult::Mismatch { reason } => assert!(reason.contains("b.txt"), "{reason}"),
        other => panic!("expected mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_verify_silent_mismatch_names_exit_status() {
    let dir = TempDir::new().unwrap();
    let verifier = Verifier::new(fake_tool(
        &dir,
        "case \"$1\" in size) echo '{\"count\":0,\"bytes\":0}' ;; check) exit 1 ;; esac\n",
    ));

    let result = verifier
        .verify(dir.path(), "remote:dest", &CancellationToken::new())
        .await;

    assert_eq!(
        result,
        VerifyResult::Mismatch {
            reason: "check exited with exit code 1".to_string()
        }
    );
}

#[tokio::test]
async fn test_verify_size_failure_is_check_error() {
    let dir = TempDir::new().unwrap();
    let verifier = Verifier::new(fake_tool(
        &dir,
        "case \"$1\" in size) echo 'directory not found' >&2; exit 3 ;; check) exit 0 ;; esac\n",
    ));

    let result = verifier
        .verify(dir.path(), "remote:dest", &CancellationToken::new())
        .await;

    assert!(matches!(result, VerifyResult::CheckError { .. }), "{result:?}");
    assert!(!result.is_verified());
}

#[tokio::test]
async fn test_verify_unparseable_size_is_check_error() {
    let dir = TempDir::new().unwrap();
    let verifier = Verifier::new(fake_tool(
        &dir,
        "case \"$1\" in size) echo 'not json' ;; check) exit 0 ;; esac\n",
    ));

    let result = verifier
        .verify(dir.path(), "remote:dest", &CancellationToken::new())
        .await;

    assert!(matches!(result, VerifyResult::CheckError { .. }), "{result:?}");
}

#[tokio::test]
async fn test_check_config() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(
        &dir,
        r#"
case "$1" in
  listremotes) printf 'other:\ngdrive:\n' ;;
  about) echo '{"total":1000,"used":400,"free":600}' ;;
esac
"#,
    );

    let space = tool
        .check_config("gdrive", Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(space.available(), 600);

    let err = tool
        .check_config("missing", Duration::from_secs(10))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::RemoteMissing { .. }), "{err}");
    assert!(err.to_string().contains("gdrive:"));
}

#[tokio::test]
async fn test_check_config_missing_tool() {
    let dir = TempDir::new().unwrap();
    let tool = TransferTool::new(dir.path().join("absent"));

    let err = tool
        .check_config("gdrive", Duration::from_secs(10))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Launch { .. }), "{err}");
}

#[tokio::test]
async fn test_check_config_timeout() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(&dir, "exec sleep 30\n");

    let err = tool
        .check_config("gdrive", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Timeout { .. }), "{err}");
}
