/// HTTP behaviour of `GitHubHost` against a mock GitHub API.
#[cfg(test)]
mod http {
    use crate::GitHubHost;
    use mockito::{Matcher, Server, ServerGuard};
    use relsync_core::config::HostConfig;
    use relsync_core::host::SourceHost;
    use relsync_core::RelsyncError;

    const BRANCH: &str = "releases/M130";

    fn host(server: &ServerGuard) -> GitHubHost {
        let config = HostConfig {
            api_url: server.url(),
            owner: "o".into(),
            repo: "r".into(),
            per_page: 2,
            ..HostConfig::default()
        };
        GitHubHost::with_token(&config, Some("t0ken".into())).unwrap()
    }

    fn on_branch() -> Matcher {
        Matcher::UrlEncoded("ref".into(), BRANCH.into())
    }

    #[tokio::test]
    async fn missing_branch_maps_404_to_false() {
        let mut server = Server::new_async().await;
        let present = server
            .mock("GET", "/repos/o/r/branches/releases/M130")
            .match_header("authorization", "Bearer t0ken")
            .with_status(200)
            .with_body(r#"{"name": "releases/M130"}"#)
            .create_async()
            .await;
        let absent = server
            .mock("GET", "/repos/o/r/branches/releases/M131")
            .with_status(404)
            .with_body(r#"{"message": "Branch not found"}"#)
            .create_async()
            .await;

        let gh = host(&server);
        assert!(gh.branch_exists(BRANCH).await.unwrap());
        assert!(!gh.branch_exists("releases/M131").await.unwrap());
        present.assert_async().await;
        absent.assert_async().await;
    }

    #[tokio::test]
    async fn branch_check_surfaces_auth_failures() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/branches/releases/M130")
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .create_async()
            .await;

        match host(&server).branch_exists(BRANCH).await {
            Err(RelsyncError::Host { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Bad credentials");
            }
            other => panic!("expected host error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_budget_is_rate_limited() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/branches/releases/M130")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", "1900000000")
            .with_body(r#"{"message": "API rate limit exceeded"}"#)
            .create_async()
            .await;

        let gh = host(&server);
        assert!(matches!(
            gh.branch_exists(BRANCH).await,
            Err(RelsyncError::RateLimited { reset_at: 1900000000 })
        ));
        assert_eq!(gh.rate_limit().remaining(), 0);
    }

    #[tokio::test]
    async fn manifest_is_read_raw_from_the_branch() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/repos/o/r/contents/release.json")
            .match_query(on_branch())
            .match_header("accept", "application/vnd.github.raw+json")
            .with_status(200)
            .with_body(r#"{"libraries": ["firebase-common"]}"#)
            .create_async()
            .await;

        let doc = host(&server).fetch_manifest(BRANCH).await.unwrap();
        assert_eq!(doc.libraries, vec!["firebase-common"]);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn missing_or_bad_documents_fail_closed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/contents/release.json")
            .match_query(on_branch())
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/o/r/contents/release_report.json")
            .match_query(on_branch())
            .with_status(200)
            .with_body(r#"{"unexpected": true}"#)
            .create_async()
            .await;

        let gh = host(&server);
        assert!(matches!(
            gh.fetch_manifest(BRANCH).await,
            Err(RelsyncError::MalformedManifest(_))
        ));
        assert!(matches!(
            gh.fetch_change_report(BRANCH).await,
            Err(RelsyncError::MalformedChangeReport(_))
        ));
    }

    #[tokio::test]
    async fn version_descriptor_404_is_a_host_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/contents/firebase-common/gradle.properties")
            .match_query(on_branch())
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/o/r/contents/firebase-firestore/gradle.properties")
            .match_query(on_branch())
            .with_status(200)
            .with_body("version=24.0.0\nlatestReleasedVersion=23.0.0\n")
            .create_async()
            .await;

        let gh = host(&server);
        assert!(matches!(
            gh.fetch_version_descriptor(BRANCH, "firebase-common/gradle.properties").await,
            Err(RelsyncError::Host { status: 404, .. })
        ));
        let raw = gh
            .fetch_version_descriptor(BRANCH, "firebase-firestore/gradle.properties")
            .await
            .unwrap();
        assert!(raw.starts_with("version=24.0.0"));
    }

    #[tokio::test]
    async fn build_workflow_picks_latest_named_run() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/actions/runs")
            .match_query(Matcher::UrlEncoded("branch".into(), BRANCH.into()))
            .with_status(200)
            .with_body(
                r#"{"total_count": 3, "workflow_runs": [
                    {"id": 1, "name": "Build Release Artifacts", "status": "completed",
                     "conclusion": "failure", "html_url": "https://x/1",
                     "created_at": "2024-05-01T10:00:00Z"},
                    {"id": 2, "name": "CI", "status": "completed", "conclusion": "success",
                     "html_url": "https://x/2", "created_at": "2024-05-04T10:00:00Z"},
                    {"id": 3, "name": "Build Release Artifacts", "status": "in_progress",
                     "conclusion": null, "html_url": "https://x/3",
                     "created_at": "2024-05-02T10:00:00Z"}
                ]}"#,
            )
            .create_async()
            .await;

        let run = host(&server).fetch_build_workflow(BRANCH).await.unwrap();
        assert_eq!(run.id, 3);
        assert_eq!(run.status, "in_progress");
        assert_eq!(run.conclusion, None);
    }

    #[tokio::test]
    async fn build_workflow_absent_is_workflow_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/actions/runs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"total_count": 0, "workflow_runs": []}"#)
            .create_async()
            .await;

        assert!(matches!(
            host(&server).fetch_build_workflow(BRANCH).await,
            Err(RelsyncError::WorkflowNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn check_runs_are_paginated_until_total_count() {
        let mut server = Server::new_async().await;
        let page = |n: &str| {
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "2".into()),
                Matcher::UrlEncoded("page".into(), n.into()),
            ])
        };
        let first = server
            .mock("GET", "/repos/o/r/commits/releases/M130/check-runs")
            .match_query(page("1"))
            .with_status(200)
            .with_body(
                r#"{"total_count": 3, "check_runs": [
                    {"id": 1, "name": "a", "head_sha": "s", "status": "completed",
                     "conclusion": "success", "html_url": "https://x/c/1", "output": {"title": null}},
                    {"id": 2, "name": "b", "head_sha": "s", "status": "queued",
                     "conclusion": null, "html_url": null}
                ]}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/repos/o/r/commits/releases/M130/check-runs")
            .match_query(page("2"))
            .with_status(200)
            .with_body(
                r#"{"total_count": 3, "check_runs": [
                    {"id": 3, "name": "c", "head_sha": "s", "status": "completed",
                     "conclusion": "failure", "html_url": null, "output": {"title": "2 errors"}}
                ]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let runs = host(&server).list_check_runs(BRANCH).await.unwrap();
        let ids: Vec<u64> = runs.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(runs[2].output_title.as_deref(), Some("2 errors"));
        first.assert_async().await;
        second.assert_async().await;
    }

    #[test]
    fn missing_repository_is_a_config_error() {
        assert!(matches!(
            GitHubHost::with_token(&HostConfig::default(), None),
            Err(RelsyncError::Config(_))
        ));
    }
}
