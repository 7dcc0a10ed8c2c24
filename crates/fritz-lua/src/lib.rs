//! Session client for the FRITZ!Box Lua web interface.
//!
//! Logging in answers the `login_sid.lua` challenge with an MD5 over the
//! UTF-16LE encoded `challenge-password`; pages are then fetched from
//! `data.lua` as JSON using the session id.

pub mod path;

use md5::{Digest, Md5};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, info, trace};

pub use path::{as_float, as_label, select};

pub const LOGIN_PATH: &str = "/login_sid.lua";
pub const DATA_PATH: &str = "/data.lua";
/// Session id reported while no session is established.
pub const INVALID_SID: &str = "0000000000000000";
/// Default web interface of a FRITZ!Box.
pub const DEFAULT_URL: &str = "http://fritz.box";

#[derive(Debug, Error)]
pub enum LuaError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Lua request response not OK: {0}")]
    Status(String),
    #[error("session info: {0}")]
    SessionInfo(String),
    #[error("login rejected for user '{0}'")]
    LoginRejected(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// `<SessionInfo>` answer of `login_sid.lua`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub sid: String,
    pub challenge: String,
}

impl SessionInfo {
    pub fn parse(xml: &str) -> Result<Self, LuaError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut info = SessionInfo::default();
        let mut current: Option<Vec<u8>> = None;
        let mut seen_root = false;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let name = e.local_name().as_ref().to_vec();
                    seen_root |= name == b"SessionInfo";
                    current = Some(name);
                }
                Ok(Event::Text(text)) => {
                    let text = text
                        .unescape()
                        .map_err(|err| LuaError::SessionInfo(err.to_string()))?;
                    match current.as_deref() {
                        Some(b"SID") => info.sid = text.into_owned(),
                        Some(b"Challenge") => info.challenge = text.into_owned(),
                        _ => {}
                    }
                }
                Ok(Event::End(_)) => current = None,
                Ok(Event::Eof) => break,
                Err(err) => return Err(LuaError::SessionInfo(err.to_string())),
                _ => {}
            }
            buf.clear();
        }
        if !seen_root {
            return Err(LuaError::SessionInfo("missing <SessionInfo>".into()));
        }
        Ok(info)
    }

    pub fn is_valid(&self) -> bool {
        !self.sid.is_empty() && self.sid != INVALID_SID
    }
}

/// `challenge-` followed by the hex MD5 of `challenge-password` in UTF-16LE.
pub fn login_response(challenge: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    for unit in format!("{challenge}-{password}").encode_utf16() {
        hasher.update(unit.to_le_bytes());
    }
    format!("{challenge}-{}", hex::encode(hasher.finalize()))
}

/// Web session bound to one gateway; the session id is reused until a
/// request fails.
#[derive(Debug)]
pub struct LuaSession {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    sid: Option<String>,
}

impl LuaSession {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, LuaError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(base_url.starts_with("https://"))
            .build()?;
        Ok(Self {
            http,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
            sid: None,
        })
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    /// Forget the session id so the next request logs in again.
    pub fn invalidate(&mut self) {
        self.sid = None;
    }

    /// Log in unless a session id is already held.
    pub async fn ensure_login(&mut self) -> Result<&str, LuaError> {
        if self.sid.is_none() {
            let sid = self.login().await?;
            self.sid = Some(sid);
        }
        Ok(self.sid.as_deref().unwrap_or_default())
    }

    async fn login(&self) -> Result<String, LuaError> {
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        let challenge = self.session_info(self.http.get(&url)).await?;
        if challenge.is_valid() {
            debug!(url = %self.base_url, "gateway granted a session without login");
            return Ok(challenge.sid);
        }

        let response = login_response(&challenge.challenge, &self.password);
        let session = self
            .session_info(
                self.http
                    .get(&url)
                    .query(&[("username", self.username.as_str()), ("response", response.as_str())]),
            )
            .await?;
        if !session.is_valid() {
            return Err(LuaError::LoginRejected(self.username.clone()));
        }
        info!(url = %self.base_url, user = %self.username, "logged in to Lua interface");
        Ok(session.sid)
    }

    async fn session_info(&self, request: reqwest::RequestBuilder) -> Result<SessionInfo, LuaError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(LuaError::Status(response.status().to_string()));
        }
        SessionInfo::parse(&response.text().await?)
    }

    /// POST `data.lua` for `page` and decode the JSON body.
    ///
    /// A failed request drops the session id.
    pub async fn fetch_page(&mut self, page: &str) -> Result<serde_json::Value, LuaError> {
        let sid = self.ensure_login().await?.to_string();
        let url = format!("{}{}", self.base_url, DATA_PATH);
        let result = self.post_page(&url, &sid, page).await;
        if result.is_err() {
            self.invalidate();
        }
        result
    }

    async fn post_page(&self, url: &str, sid: &str, page: &str) -> Result<serde_json::Value, LuaError> {
        let response = self
            .http
            .post(url)
            .form(&[("sid", sid), ("page", page)])
            .send()
            .await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(LuaError::Status(response.status().to_string()));
        }
        let body = response.bytes().await?;
        trace!(%page, bytes = body.len(), "fetched data.lua page");
        Ok(serde_json::from_slice(&body)?)
    }
}
