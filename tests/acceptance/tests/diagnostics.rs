//! Failures and debug output are visible in captured logs.

use ta_acceptance::{finish, suite};
use ta_fixture::{HarnessError, Layout};

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_missing_artifact_fails_with_logs() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };
    let mut scenario = suite.scenario().await?;

    let verdict = async {
        let bogus = format!("oci:{}@sha256:{}", scenario.store_location()?, "0".repeat(64));
        std::fs::write(scenario.sandbox().results_dir().join("missing"), bogus)?;

        match scenario.use_artifact("missing").await {
            Err(HarnessError::CommandFailed { logs, .. }) if logs.to_lowercase().contains("error") => Ok(()),
            Err(e) => Err(HarnessError::assertion(format!("unexpected failure: {e}"))),
            Ok(()) => Err(HarnessError::assertion("using a missing artifact succeeded")),
        }
    }
    .await;

    finish(scenario, verdict).await
}

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_debug_mode_adds_log_lines() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };
    let mut scenario = suite.scenario().await?;

    let verdict = async {
        scenario.write_source_file("debug.txt", "debug me\n")?;
        scenario.create_artifact("plain", "debug.txt").await?;
        let plain = scenario.last_logs().to_string();

        scenario.enable_debug();
        scenario.create_artifact("verbose", "debug.txt").await?;
        let verbose = scenario.last_logs().to_string();

        let extra = verbose.lines().filter(|l| !plain.contains(l)).count();
        if extra == 0 {
            return Err(HarnessError::assertion(format!(
                "debug mode added no log lines:\n{verbose}"
            )));
        }
        Ok(())
    }
    .await;

    finish(scenario, verdict).await
}
