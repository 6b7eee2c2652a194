// Console HTTP API over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use spc_common::protocol::api::{
    ApiResponse, ConsoleReply, ConsoleRequest, MeReply, SignInReply, SignInRequest, CONSOLE_PATH,
    ME_PATH, SIGNIN_PATH, TOKEN_HEADER, USERNAME_HEADER,
};

use super::ConsoleApi;
use crate::error::ApiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    /// Build a client rooted at `api_url` (e.g. `https://screeps.com/api`).
    pub fn new(api_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| ApiError::Request(error.to_string()))?;
        Ok(Self { client, base_url: api_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.header(USERNAME_HEADER, token).header(TOKEN_HEADER, token)
    }
}

#[async_trait]
impl ConsoleApi for HttpApi {
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ApiResponse<SignInReply>, ApiError> {
        let body = SignInRequest { email: email.to_string(), password: password.to_string() };
        let response =
            self.client.post(self.url(SIGNIN_PATH)).json(&body).send().await.map_err(transport)?;
        read_response(response).await
    }

    async fn me(&self, token: &str) -> Result<ApiResponse<MeReply>, ApiError> {
        let response = self
            .authorized(self.client.get(self.url(ME_PATH)), token)
            .send()
            .await
            .map_err(transport)?;
        read_response(response).await
    }

    async fn console(
        &self,
        token: &str,
        expression: &str,
    ) -> Result<ApiResponse<ConsoleReply>, ApiError> {
        let body = ConsoleRequest { expression: expression.to_string() };
        let response = self
            .authorized(self.client.post(self.url(CONSOLE_PATH)), token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        read_response(response).await
    }
}

async fn read_response<T>(response: Response) -> Result<ApiResponse<T>, ApiError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let status = response.status().as_u16();
    let header_token = response
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let raw = response.text().await.map_err(transport)?;
    Ok(ApiResponse::decode(status, header_token, raw))
}

fn transport(error: reqwest::Error) -> ApiError {
    ApiError::Transport(error.to_string())
}
