use crate::config::PlatformConfig;
use crate::provider::{EnvironmentProvider, PlatformError, PlatformResult};
use crate::types::{Build, SoftwareEnvironment, SoftwareEnvironmentSpec, UserInfo};
use async_trait::async_trait;
use image_ref::ImageReference;
use reqwest::header::AUTHORIZATION;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const DEFAULT_ARCHITECTURE: &str = "x86_64";

#[derive(Debug, Serialize)]
struct CreateEnvironmentRequest<'a> {
    name: &'a str,
    container: &'a ImageReference,
    force_rebuild: bool,
    architecture: &'static str,
    gpu_enabled: bool,
}

/// Client for the Coiled software environment API
pub struct CoiledProvider {
    client: reqwest::Client,
    config: PlatformConfig,
    token: String,
    account: OnceCell<String>,
}

impl CoiledProvider {
    pub fn new(config: PlatformConfig) -> PlatformResult<Self> {
        config
            .validate()
            .map_err(|message| PlatformError::InvalidConfig { message })?;
        let token = config.require_token()?.to_string();

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("create-software-env/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            config,
            token,
            account: OnceCell::new(),
        })
    }

    /// Build a provider from `DASK_COILED__*` variables and the dask config file
    pub fn from_environment() -> PlatformResult<Self> {
        Self::new(PlatformConfig::from_environment()?)
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// The account environments are created in. Falls back to the
    /// authenticated user's default account, looked up once.
    pub async fn account(&self) -> PlatformResult<&str> {
        let account = self
            .account
            .get_or_try_init(|| self.resolve_account())
            .await?;
        Ok(account.as_str())
    }

    async fn resolve_account(&self) -> PlatformResult<String> {
        if let Some(account) = &self.config.account {
            return Ok(account.clone());
        }

        let user = self.current_user().await?;
        debug!(
            "Using default account of {}: {}",
            user.username,
            user.account()
        );
        Ok(user.account().to_string())
    }

    pub async fn current_user(&self) -> PlatformResult<UserInfo> {
        let response = self
            .client
            .get(self.endpoint(&["api", "v2", "user", "me"])?)
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        Self::parse_response(response, "current user").await
    }

    /// Server URL extended by `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> PlatformResult<Url> {
        let mut url = Url::parse(self.config.base_url()).map_err(|e| {
            PlatformError::InvalidConfig {
                message: format!("Invalid server URL '{}': {}", self.config.server, e),
            }
        })?;

        url.path_segments_mut()
            .map_err(|_| PlatformError::InvalidConfig {
                message: format!("Server URL '{}' cannot carry a path", self.config.server),
            })?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn auth_header(&self) -> String {
        format!("ApiToken {}", self.token)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
        resource: &str,
    ) -> PlatformResult<T> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await.map_err(Self::handle_http_error)?;
            return Ok(serde_json::from_str(&body)?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::status_error(status, resource, &body))
    }

    fn status_error(status: StatusCode, resource: &str, body: &str) -> PlatformError {
        match status.as_u16() {
            401 | 403 => PlatformError::Authentication,
            404 => PlatformError::NotFound {
                resource: resource.to_string(),
            },
            429 => PlatformError::RateLimit,
            502..=504 => PlatformError::ServiceUnavailable {
                message: format!("{} while requesting {}", status, resource),
            },
            code => PlatformError::Api {
                status: code,
                message: Self::error_message(body),
            },
        }
    }

    /// Pull the human readable part out of an error body
    fn error_message(body: &str) -> String {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let field = parsed.as_ref().and_then(|value| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| value.get(*key))
        });

        match field {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None if body.trim().is_empty() => "empty response body".to_string(),
            None => body.trim().to_string(),
        }
    }

    fn handle_http_error(err: reqwest::Error) -> PlatformError {
        if err.is_timeout() {
            PlatformError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            PlatformError::ServiceUnavailable {
                message: "Cannot connect to platform server".to_string(),
            }
        } else {
            PlatformError::Network(err)
        }
    }
}

#[async_trait]
impl EnvironmentProvider for CoiledProvider {
    async fn create_or_update_environment(
        &self,
        spec: &SoftwareEnvironmentSpec,
    ) -> PlatformResult<SoftwareEnvironment> {
        spec.validate()
            .map_err(|message| PlatformError::InvalidConfig { message })?;

        let account = self.account().await?;
        let url = self.endpoint(&["api", "v2", "software-environment", "account", account])?;

        let body = CreateEnvironmentRequest {
            name: &spec.name,
            container: &spec.container,
            force_rebuild: spec.force_rebuild,
            architecture: DEFAULT_ARCHITECTURE,
            gpu_enabled: false,
        };

        info!(
            "Creating software environment {}/{} from {} (force_rebuild: {})",
            account, spec.name, spec.container, spec.force_rebuild
        );

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        let environment: SoftwareEnvironment =
            Self::parse_response(response, &format!("account {}", account)).await?;

        match &environment.build {
            Some(build) => debug!(
                "Environment {} queued build {} ({})",
                environment.name, build.id, build.state
            ),
            None => warn!(
                "Environment {} returned no build; an existing build was reused",
                environment.name
            ),
        }

        Ok(environment)
    }

    async fn build_status(&self, build_id: u64) -> PlatformResult<Build> {
        let account = self.account().await?;
        let build_id = build_id.to_string();
        let url = self.endpoint(&[
            "api",
            "v2",
            "software-environment",
            "account",
            account,
            "build",
            &build_id,
        ])?;

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        Self::parse_response(response, &format!("build {}", build_id)).await
    }

    async fn health_check(&self) -> PlatformResult<()> {
        let user = self.current_user().await?;
        debug!("Authenticated as {}", user.username);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "coiled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BuildState;
    use mockito::{mock, Matcher};
    use serde_json::json;
    use serial_test::serial;

    fn provider(account: Option<&str>) -> CoiledProvider {
        let mut config = PlatformConfig::new()
            .with_server(mockito::server_url())
            .with_token("test-token");
        if let Some(account) = account {
            config = config.with_account(account);
        }
        CoiledProvider::new(config).unwrap()
    }

    fn spec() -> SoftwareEnvironmentSpec {
        SoftwareEnvironmentSpec::new(
            "cng-workshop",
            ImageReference::parse("public.ecr.aws/q2i2x3t4/e84-sandbox/coiled-demo").unwrap(),
        )
        .with_force_rebuild(true)
    }

    #[test]
    fn test_requires_token() {
        let err = CoiledProvider::new(PlatformConfig::default()).err().unwrap();
        assert!(matches!(err, PlatformError::MissingCredentials { .. }));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = PlatformConfig::default()
            .with_server("ftp://example.com")
            .with_token("t");
        let err = CoiledProvider::new(config).err().unwrap();
        assert!(matches!(err, PlatformError::InvalidConfig { .. }));
    }

    #[test]
    fn test_endpoint_escapes_account() {
        let provider = CoiledProvider::new(
            PlatformConfig::new()
                .with_server("https://cloud.example.com/")
                .with_token("t"),
        )
        .unwrap();

        let url = provider
            .endpoint(&["api", "v2", "software-environment", "account", "team/a?b", "build", "5"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://cloud.example.com/api/v2/software-environment/account/team%2Fa%3Fb/build/5"
        );
    }

    #[test]
    fn test_endpoint_keeps_server_path_prefix() {
        let provider = CoiledProvider::new(
            PlatformConfig::new()
                .with_server("https://proxy.example.com/coiled")
                .with_token("t"),
        )
        .unwrap();

        let url = provider.endpoint(&["api", "v2", "user", "me"]).unwrap();
        assert_eq!(url.as_str(), "https://proxy.example.com/coiled/api/v2/user/me");
    }

    #[tokio::test]
    #[serial]
    async fn test_account_with_reserved_characters_stays_in_one_segment() {
        let m = mock("GET", "/api/v2/software-environment/account/team%2Fa%3Fb/build/5")
            .with_status(200)
            .with_body(r#"{"id": 5, "state": "built"}"#)
            .expect(1)
            .create();

        let build = provider(Some("team/a?b")).build_status(5).await.unwrap();

        m.assert();
        assert_eq!(build.state, BuildState::Built);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            CoiledProvider::error_message(r#"{"detail": "bad container"}"#),
            "bad container"
        );
        assert_eq!(
            CoiledProvider::error_message(r#"{"message": "nope"}"#),
            "nope"
        );
        assert_eq!(
            CoiledProvider::error_message(r#"{"detail": [{"loc": "name"}]}"#),
            r#"[{"loc":"name"}]"#
        );
        assert_eq!(CoiledProvider::error_message("  gateway  "), "gateway");
        assert_eq!(CoiledProvider::error_message(""), "empty response body");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            CoiledProvider::status_error(StatusCode::UNAUTHORIZED, "x", ""),
            PlatformError::Authentication
        ));
        assert!(matches!(
            CoiledProvider::status_error(StatusCode::FORBIDDEN, "x", ""),
            PlatformError::Authentication
        ));
        assert!(matches!(
            CoiledProvider::status_error(StatusCode::NOT_FOUND, "x", ""),
            PlatformError::NotFound { .. }
        ));
        assert!(matches!(
            CoiledProvider::status_error(StatusCode::TOO_MANY_REQUESTS, "x", ""),
            PlatformError::RateLimit
        ));
        assert!(matches!(
            CoiledProvider::status_error(StatusCode::SERVICE_UNAVAILABLE, "x", ""),
            PlatformError::ServiceUnavailable { .. }
        ));
        assert!(matches!(
            CoiledProvider::status_error(StatusCode::UNPROCESSABLE_ENTITY, "x", "{}"),
            PlatformError::Api { status: 422, .. }
        ));
    }

    #[tokio::test]
    #[serial]
    async fn test_create_environment_request() {
        let m = mock("POST", "/api/v2/software-environment/account/workshop")
            .match_header("authorization", "ApiToken test-token")
            .match_body(Matcher::Json(json!({
                "name": "cng-workshop",
                "container": "public.ecr.aws/q2i2x3t4/e84-sandbox/coiled-demo",
                "force_rebuild": true,
                "architecture": "x86_64",
                "gpu_enabled": false
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": 7,
                    "name": "cng-workshop",
                    "latest_build": {"id": 99, "state": "queued"}
                })
                .to_string(),
            )
            .expect(1)
            .create();

        let env = provider(Some("workshop"))
            .create_or_update_environment(&spec())
            .await
            .unwrap();

        m.assert();
        assert_eq!(env.id, 7);
        assert_eq!(env.name, "cng-workshop");
        let build = env.build.unwrap();
        assert_eq!(build.id, 99);
        assert_eq!(build.state, BuildState::Queued);
    }

    #[tokio::test]
    #[serial]
    async fn test_default_account_resolved_once() {
        let me = mock("GET", "/api/v2/user/me")
            .with_status(200)
            .with_body(r#"{"username": "alice", "default_account": "team"}"#)
            .expect(1)
            .create();
        let build = mock("GET", "/api/v2/software-environment/account/team/build/5")
            .with_status(200)
            .with_body(r#"{"id": 5, "state": "building"}"#)
            .expect(2)
            .create();

        let provider = provider(None);
        let first = provider.build_status(5).await.unwrap();
        let second = provider.build_status(5).await.unwrap();

        me.assert();
        build.assert();
        assert_eq!(first.state, BuildState::Building);
        assert_eq!(second.id, 5);
        assert_eq!(provider.account().await.unwrap(), "team");
    }

    #[tokio::test]
    #[serial]
    async fn test_create_environment_rejected() {
        let _m = mock("POST", "/api/v2/software-environment/account/workshop")
            .with_status(400)
            .with_body(r#"{"detail": "Container not found"}"#)
            .create();

        let err = provider(Some("workshop"))
            .create_or_update_environment(&spec())
            .await
            .unwrap_err();

        match err {
            PlatformError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Container not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_authentication_failure() {
        let _m = mock("GET", "/api/v2/user/me")
            .with_status(401)
            .with_body(r#"{"detail": "Invalid token"}"#)
            .create();

        let err = provider(None).health_check().await.unwrap_err();
        assert!(matches!(err, PlatformError::Authentication));
    }

    #[tokio::test]
    #[serial]
    async fn test_health_check() {
        let _m = mock("GET", "/api/v2/user/me")
            .match_header("authorization", "ApiToken test-token")
            .with_status(200)
            .with_body(r#"{"username": "alice"}"#)
            .create();

        provider(None).health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_spec_not_sent() {
        let bad = SoftwareEnvironmentSpec::new("Bad Name", spec().container);
        let provider = CoiledProvider::new(
            PlatformConfig::new()
                .with_server("http://127.0.0.1:1")
                .with_token("t")
                .with_account("a"),
        )
        .unwrap();

        let err = provider
            .create_or_update_environment(&bad)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let provider = CoiledProvider::new(
            PlatformConfig::new()
                .with_server("http://127.0.0.1:1")
                .with_token("t")
                .with_account("a"),
        )
        .unwrap();

        let err = provider.build_status(1).await.unwrap_err();
        assert!(matches!(err, PlatformError::ServiceUnavailable { .. }));
    }
}
