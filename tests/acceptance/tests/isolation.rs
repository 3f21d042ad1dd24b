//! Back-to-back scenarios share nothing and leave nothing behind.

use ta_acceptance::suite;
use ta_fixture::runner::SCENARIO_LABEL;
use ta_fixture::Layout;

#[tokio::test]
#[ignore = "requires a container runtime and the artifact CLI build context"]
async fn test_scenarios_leave_no_residue() -> anyhow::Result<()> {
    let Some(suite) = suite().await? else {
        return Ok(());
    };

    let mut first = suite.scenario().await?;
    let first_root = first.sandbox().root().to_path_buf();
    first.write_source_file("one.txt", "one")?;
    first.create_artifact("one", "one.txt").await?;
    let first_id = first.id().to_string();
    first.teardown().await;

    let mut second = suite.scenario().await?;
    let second_root = second.sandbox().root().to_path_buf();
    let second_id = second.id().to_string();
    second.teardown().await;

    // Teardown twice is harmless.
    assert!(second.teardown().await.steps().is_empty());

    assert_ne!(first_root, second_root);
    assert!(!first_root.exists(), "{} left behind", first_root.display());
    assert!(!second_root.exists(), "{} left behind", second_root.display());

    for id in [first_id, second_id] {
        let leftovers = suite
            .client()
            .container_list(&[format!("{SCENARIO_LABEL}={id}")])
            .await?;
        assert!(leftovers.is_empty(), "containers left for {id}: {leftovers:?}");
    }
    Ok(())
}
