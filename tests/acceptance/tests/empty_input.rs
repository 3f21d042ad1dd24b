//! Empty sources produce a fixed reference and restore nothing.

use ta_acceptance::{finish, suite};
use ta_fixture::{HarnessError, Layout, Scenario};

/// Creates an artifact from an empty directory and returns its reference.
async fn empty_reference(scenario: &mut Scenario, result: &str) -> ta_fixture::Result<String> {
    let dir = scenario.sandbox().source_dir().join(result);
    if !dir.exists() {
        std::fs::create_dir(&dir)?;
    }
    scenario.create_artifact(result, result).await?;
    scenario.result_reference(result)
}

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_empty_path_reference_is_deterministic() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };
    let mut scenario = suite.scenario().await?;

    let verdict = async {
        let first = empty_reference(&mut scenario, "first").await?;
        let second = empty_reference(&mut scenario, "second").await?;
        if first != second {
            return Err(HarnessError::assertion(format!(
                "empty artifact references differ: {first} != {second}"
            )));
        }

        scenario.use_artifact("first").await?;
        scenario.no_restored_files()
    }
    .await;

    finish(scenario, verdict).await
}

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_empty_path_skips_registry_push() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };
    let mut scenario = suite.scenario().await?;

    let verdict = async {
        std::fs::create_dir(scenario.sandbox().source_dir().join("empty"))?;
        scenario.create_artifact("empty", "empty").await?;
        scenario.artifact_creation_skipped().await
    }
    .await;

    finish(scenario, verdict).await
}

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_empty_reference_is_shared_across_scenarios() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };

    let mut first = suite.scenario().await?;
    let verdict = empty_reference(&mut first, "empty").await;
    let first_ref = verdict.as_ref().ok().cloned();
    finish(first, verdict.map(drop)).await?;

    let mut second = suite.scenario().await?;
    let verdict = async {
        let second_ref = empty_reference(&mut second, "empty").await?;
        // Different sandboxes and registries, same reference.
        if first_ref.as_deref() != Some(second_ref.as_str()) {
            return Err(HarnessError::assertion(format!(
                "empty artifact reference changed between scenarios: {first_ref:?} != {second_ref}"
            )));
        }
        Ok(())
    }
    .await;

    finish(second, verdict).await
}
