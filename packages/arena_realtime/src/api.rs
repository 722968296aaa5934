//! Thin client for the authentication backend's HTTP API.
//!
//! The backend authenticates with cookies set by the login endpoint, so one
//! [`ApiClient`] (and its clones, which share the cookie jar) must be used
//! for a whole session.

use reqwest::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::BackendConfig;
use crate::error::ApiError;
use crate::models::{Credentials, NewUser, UserProfile};

pub const ACCESS_TOKEN_PATH: &str = "/authentication/auth/token/get-access/";
pub const LOGIN_PATH: &str = "/authentication/auth/login/";
pub const LOGOUT_PATH: &str = "/authentication/auth/logout/";
pub const ME_PATH: &str = "/authentication/users/me/";
pub const REGISTER_PATH: &str = "/authentication/users/";
pub const UPLOAD_AVATAR_PATH: &str = "/authentication/upload-avatar/";
pub const GET_AVATAR_PATH: &str = "/authentication/get-avatar/";

const LOGIN_OK: &str = "Login successful";
const AVATAR_UPLOAD_OK: &str = "Avatar uploaded successfully";

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct MeResponse {
    user: Option<UserProfile>,
}

#[derive(Deserialize)]
struct AvatarResponse {
    avatar_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    origin: Url,
}

impl ApiClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let origin = Url::parse(&config.base_url)?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ApiError::Http)?;
        Ok(Self { http, origin })
    }

    /// The page origin the realtime endpoint is derived from.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.origin.join(path)?)
    }

    /// One-time credential for the realtime connection.
    pub async fn access_token(&self) -> Result<String, ApiError> {
        let body: TokenResponse = self.get_json(ACCESS_TOKEN_PATH).await?;
        body.token
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingField("token"))
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url(LOGIN_PATH)?)
            .json(credentials)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        let body: MessageResponse = json_body(check_status(resp).await?).await?;
        if body.message != LOGIN_OK {
            return Err(ApiError::LoginRejected(body.message));
        }
        debug!(username = %credentials.username, "logged in");
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url(LOGOUT_PATH)?)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        check_status(resp).await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        let body: MeResponse = self.get_json(ME_PATH).await?;
        body.user.ok_or(ApiError::MissingField("user"))
    }

    pub async fn register(&self, new_user: &NewUser) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url(REGISTER_PATH)?)
            .json(new_user)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        check_status(resp).await?;
        Ok(())
    }

    /// Upload a new avatar image as the multipart field `avatar`.
    pub async fn upload_avatar(&self, file_name: &str, bytes: Vec<u8>) -> Result<(), ApiError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("avatar", part);
        let resp = self
            .http
            .post(self.url(UPLOAD_AVATAR_PATH)?)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        let body: MessageResponse = json_body(check_status(resp).await?).await?;
        if body.message != AVATAR_UPLOAD_OK {
            return Err(ApiError::UploadRejected(body.message));
        }
        Ok(())
    }

    pub async fn avatar_url(&self) -> Result<String, ApiError> {
        let body: AvatarResponse = self.get_json(GET_AVATAR_PATH).await?;
        body.avatar_url
            .filter(|u| !u.is_empty())
            .ok_or(ApiError::MissingField("avatar_url"))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self
            .http
            .get(self.url(path)?)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        json_body(check_status(resp).await?).await
    }
}

async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn json_body<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    resp.json().await.map_err(ApiError::from_reqwest)
}
