//! HTTP client for the Compass portal.
//!
//! A thin layer over a [`ureq::Agent`] that keeps the ASP.NET session cookie,
//! sends the authorisation headers Compass expects on every request, counts
//! requests, and turns transport failures into [`CompassError::Network`].

use chrono::Utc;
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use ureq::http::{Response, Uri};
use ureq::{Agent, Body, RequestBuilder, ResponseExt};

use crate::error::{CompassError, Result};
use crate::settings::Settings;
use crate::utility::compass_restify;

/// A fully read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    /// Final URL, after redirects
    pub url: String,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Compass signals overload and crashes with 5XX codes.
    pub fn error_for_server_status(self) -> Result<Self> {
        if self.status >= 500 {
            return Err(CompassError::Network(format!(
                "Compass returned HTTP {} for '{}'",
                self.status, self.url
            )));
        }
        Ok(self)
    }
}

/// The identifiers Compass mixes into authenticated request hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIds {
    pub membership_number: i64,
    pub role_number: i64,
    pub jk: String,
}

#[derive(Debug)]
pub struct Client {
    agent: Agent,
    settings: Settings,
    headers: RwLock<BTreeMap<String, String>>,
    total_requests: AtomicUsize,
}

impl Client {
    pub fn new(settings: Settings) -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(settings.timeout()))
            .build()
            .into();
        Client {
            agent,
            settings,
            headers: RwLock::new(BTreeMap::new()),
            total_requests: AtomicUsize::new(0),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Number of requests sent through this client so far.
    pub fn total_requests(&self) -> usize {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Sets a header sent with every following request.
    pub fn set_header(&self, name: &str, value: &str) {
        self.headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn has_cookies(&self) -> bool {
        self.agent.cookie_jar_lock().iter().next().is_some()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.agent
            .cookie_jar_lock()
            .iter()
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_string())
    }

    /// Stores a cookie for the portal root, as if Compass had set it.
    pub fn set_cookie(&self, name: &str, value: &str) -> Result<()> {
        let uri: Uri = self
            .settings
            .url("/")
            .parse()
            .map_err(|e| CompassError::Config(format!("Invalid base URL: {}", e)))?;
        let raw = format!("{}={}; Path=/", name, value);
        let cookie = ureq::Cookie::parse(raw, &uri)?;
        self.agent.cookie_jar_lock().insert(cookie, &uri)?;
        Ok(())
    }

    pub fn head(&self, url: &str) -> Result<Reply> {
        let request = self.prepare(self.agent.head(url), &[]);
        self.read(url, request.call(), false)
    }

    pub fn get(&self, url: &str) -> Result<Reply> {
        self.get_with(url, &[], &[])
    }

    pub fn get_with(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<Reply> {
        let mut request = self.prepare(self.agent.get(url), headers);
        for (key, value) in query {
            request = request.query(*key, value.as_str());
        }
        self.read(url, request.call(), false)
    }

    pub fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Reply> {
        let request = self.prepare(self.agent.post(url), headers);
        let fields = form.iter().map(|(k, v)| (k.as_str(), v.as_str()));
        self.read(url, request.send_form(fields), false)
    }

    pub fn post_json<T: Serialize>(&self, url: &str, body: &T) -> Result<Reply> {
        let request = self.prepare(self.agent.post(url), &[]);
        self.read(url, request.send_json(body), false)
    }

    /// GET for large exports: uses the report timeout and no body size limit.
    pub fn download(&self, url: &str, query: &[(String, String)]) -> Result<Reply> {
        let mut request = self
            .prepare(self.agent.get(url), &[])
            .config()
            .timeout_global(Some(self.settings.report_timeout()))
            .build();
        for (key, value) in query {
            request = request.query(key.as_str(), value.as_str());
        }
        self.read(url, request.call(), true)
    }

    /// Computes the JK hash for an authenticated request and registers it
    /// with Compass through the preflight endpoint.
    pub fn jk_hash(&self, auth: &AuthIds) -> Result<String> {
        let key_hash = format!(
            "{}{}{}{}",
            Utc::now().timestamp_millis(),
            auth.jk,
            auth.role_number,
            auth.membership_number
        );
        let data = compass_restify([
            ("pKeyHash", key_hash.clone()),
            ("pCN", auth.membership_number.to_string()),
        ]);
        debug!("Sending preflight data {}", Utc::now());
        self.post_json(&self.settings.url("System/Preflight"), &data)?;
        Ok(key_hash)
    }

    /// GET with the `Auth` hash header and `x1`/`x2`/`x3` identity parameters.
    pub fn get_with_auth(
        &self,
        url: &str,
        auth: &AuthIds,
        query: &[(&str, String)],
    ) -> Result<Reply> {
        let key_hash = self.jk_hash(auth)?;
        let mut params = query.to_vec();
        params.push(("x1", auth.membership_number.to_string()));
        params.push(("x2", auth.jk.clone()));
        params.push(("x3", auth.role_number.to_string()));
        self.get_with(url, &params, &[("Auth", key_hash.as_str())])
    }

    fn prepare<B>(&self, mut request: RequestBuilder<B>, extra: &[(&str, &str)]) -> RequestBuilder<B> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut headers = BTreeMap::new();
        headers.insert("User-Agent".to_string(), self.settings.user_agent.clone());
        headers.extend(
            self.headers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        headers.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    fn read(
        &self,
        url: &str,
        result: std::result::Result<Response<Body>, ureq::Error>,
        unlimited: bool,
    ) -> Result<Reply> {
        let mut response =
            result.map_err(|e| CompassError::Network(format!("'{}': {}", url, e)))?;
        let status = response.status().as_u16();
        let final_url = response.get_uri().to_string();
        let body = if unlimited {
            response
                .body_mut()
                .with_config()
                .limit(u64::MAX)
                .read_to_vec()?
        } else {
            response.body_mut().read_to_vec()?
        };
        debug!("{} {} ({} bytes)", status, final_url, body.len());
        Ok(Reply {
            status,
            url: final_url,
            body,
        })
    }
}
