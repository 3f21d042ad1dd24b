//! Round-trip scenarios: what goes into an artifact comes back out.

use ta_acceptance::{finish, suite};
use ta_fixture::scenario::DUMMY_RESULT;
use ta_fixture::{HarnessError, Layout};

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_single_file_round_trip() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };
    let mut scenario = suite.scenario().await?;

    let verdict = async {
        scenario.write_source_file("hello.txt", "hello\nworld\n\nno trailing newline")?;
        scenario.create_artifact("hello", "hello.txt").await?;
        scenario.use_artifact("hello").await?;
        scenario.restored_file_matches_source("hello.txt")
    }
    .await;

    finish(scenario, verdict).await
}

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_multi_file_round_trip() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };
    let mut scenario = suite.scenario().await?;

    let files = [("a.txt", "hello"), ("sub/b.txt", "world")];
    let verdict = async {
        scenario.write_files(&files)?;
        scenario.create_artifact("multi", ".").await?;
        scenario.artifact_contains("multi", &files).await
    }
    .await;

    finish(scenario, verdict).await
}

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_local_store_round_trip() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };
    let mut scenario = suite.scenario().await?;

    let verdict = async {
        scenario.write_source_file("local.txt", "stored on the filesystem\n")?;
        scenario.create_artifact_local("local", "local.txt").await?;
        scenario.use_artifact("local").await?;
        scenario.restored_file_matches_source("local.txt")?;

        let stored = std::fs::read_dir(scenario.sandbox().artifacts_dir())?.count();
        if stored == 0 {
            return Err(ta_fixture::HarnessError::assertion("artifacts/ is empty"));
        }
        Ok(())
    }
    .await;

    finish(scenario, verdict).await
}

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_dummy_artifact_is_empty() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };
    let mut scenario = suite.scenario().await?;

    let verdict = async {
        std::fs::create_dir(scenario.sandbox().source_dir().join("empty"))?;
        scenario.create_artifact("empty", "empty").await?;
        scenario.create_dummy_artifact().await?;

        // dummy.txt sits beside the packaged path, so nothing is captured.
        let dummy = scenario.result_reference(DUMMY_RESULT)?;
        let empty = scenario.result_reference("empty")?;
        if dummy != empty {
            return Err(HarnessError::assertion(format!(
                "dummy artifact is not the empty one: {dummy} != {empty}"
            )));
        }

        scenario.use_artifact(DUMMY_RESULT).await?;
        scenario.no_restored_files()
    }
    .await;

    finish(scenario, verdict).await
}
