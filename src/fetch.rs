//!
//! src/fetch.rs
//!
//! Defines methods for hitting provider endpoints and returning
//! unparsed responses. Retries and response decoding live in
//! providers.rs.
//!

use reqwest::{header, redirect, Client, RequestBuilder};

use crate::config::{AppleMusicConfig, HttpConfig, SpotifyConfig};
use crate::errors::ResolverError;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, ResolverError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_helper(http)
        .default_headers(h)
        .build()
        .map_err(|e| ResolverError::Http(format!("build client: {e}")))
}

#[derive(Clone, Debug)]
pub struct SpotifyHttp {
    pub http: Client,
    pub cfg: SpotifyConfig,
}

impl SpotifyHttp {
    pub fn new(http_config: &HttpConfig, cfg: &SpotifyConfig) -> Result<Self, ResolverError> {
        let http = base_client(http_config)?;
        Ok(Self { http, cfg: cfg.clone() })
    }

    /// POST token_url with client-credentials grant
    pub fn token_request(&self) -> RequestBuilder {
        self.http
            .post(self.cfg.token_url.clone())
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
    }

    /// GET /v1/search?type=album&q=...&limit=&market=
    pub fn search_albums(&self, query: &str, limit: u32, bearer: &str) -> RequestBuilder {
        let url = self.cfg.api_base.join("search").unwrap();
        self.http.get(url).bearer_auth(bearer).query(&[
            ("type", "album"),
            ("q", query),
            ("limit", &limit.to_string()),
            ("market", &self.cfg.market),
        ])
    }

    /// GET /v1/albums/{id}/tracks?limit=&offset=
    pub fn album_tracks(
        &self,
        album_id: &str,
        limit: u32,
        offset: u32,
        bearer: &str,
    ) -> RequestBuilder {
        let url = self.cfg.api_base.join(&format!("albums/{album_id}/tracks")).unwrap();
        self.http.get(url).bearer_auth(bearer).query(&[
            ("limit", &limit.to_string()),
            ("offset", &offset.to_string()),
        ])
    }
}

#[derive(Clone, Debug)]
pub struct AppleHttp {
    pub http: Client,
    pub cfg: AppleMusicConfig,
}

impl AppleHttp {
    pub fn new(http_config: &HttpConfig, cfg: &AppleMusicConfig) -> Result<Self, ResolverError> {
        let http = base_client(http_config)?;
        Ok(Self { http, cfg: cfg.clone() })
    }

    /// GET /search?term=...&entity=album&limit=&country=
    pub fn search_albums(&self, term: &str, limit: u32) -> RequestBuilder {
        self.http.get(self.cfg.search_url.clone()).query(&[
            ("term", term),
            ("entity", "album"),
            ("limit", &limit.to_string()),
            ("country", &self.cfg.country),
        ])
    }

    /// GET /lookup?id=...&entity=song&country=
    pub fn lookup_tracks(&self, collection_id: &str) -> RequestBuilder {
        self.http.get(self.cfg.lookup_url.clone()).query(&[
            ("id", collection_id),
            ("entity", "song"),
            ("country", &self.cfg.country),
        ])
    }
}
