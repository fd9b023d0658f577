use async_trait::async_trait;
use fieldmark_core::auth::{AuthProvider, Credentials, StaticAuth};
use fieldmark_core::config::ErpConfig;
use fieldmark_core::gateway::{
    normalize_rows, row_name, AttendanceGateway, Filter, GatewayError, RecordQuery, Row,
};
use fieldmark_core::photo::PhotoAsset;
use fieldmark_core::roster::RosterProvider;
use fieldmark_core::types::{Employee, NewCheckin};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::wire::{checkin_body, data_object, server_message, EMPLOYEE_FIELDS, SUPERVISOR_FIELD};
use crate::{ErpError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── ErpClient ────────────────────────────────────────────────────────────

/// HTTP client for one ERPNext site.
///
/// Cheap to share behind an `Arc`; the underlying `reqwest::Client` pools
/// connections and holds the session cookie after [`login`](Self::login).
pub struct ErpClient {
    http: reqwest::Client,
    base: Url,
    credentials: Credentials,
    checkin_doctype: String,
    employee_doctype: String,
}

impl ErpClient {
    pub fn new(cfg: &ErpConfig, credentials: Credentials) -> Result<Self> {
        let base = Url::parse(cfg.base_url.trim()).map_err(|e| ErpError::BaseUrl {
            url: cfg.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ErpError::BaseUrl {
                url: cfg.base_url.clone(),
                reason: "cannot be a base".into(),
            });
        }

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("fieldmark/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base,
            credentials,
            checkin_doctype: cfg.checkin_doctype.clone(),
            employee_doctype: cfg.employee_doctype.clone(),
        })
    }

    /// Build a client from whatever the auth provider currently holds.
    pub fn from_auth(cfg: &ErpConfig, auth: &dyn AuthProvider) -> Result<Self> {
        Self::new(cfg, auth.credentials())
    }

    // ─── Plumbing ─────────────────────────────────────────────────────────

    /// `base` + path segments, each percent-encoded (doctypes contain spaces).
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ErpError::BaseUrl {
                url: self.base.to_string(),
                reason: "cannot be a base".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let rb = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match self.credentials.authorization_header() {
            Some(value) => rb.header(reqwest::header::AUTHORIZATION, value),
            None => rb,
        }
    }

    /// Send and decode a JSON body, turning non-2xx into [`ErpError::Status`].
    async fn send(&self, rb: RequestBuilder) -> Result<Value> {
        let resp = rb.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = server_message(&body);
            debug!(status = status.as_u16(), message = ?message, "request failed");
            return Err(ErpError::Status {
                status: status.as_u16(),
                message,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    // ─── Session ──────────────────────────────────────────────────────────

    /// Password login; the session cookie is kept for later requests.
    pub async fn login(&self, user: &str, password: &str) -> Result<()> {
        let url = self.url(&["api", "method", "login"])?;
        let rb = self
            .request(Method::POST, url)
            .json(&json!({ "usr": user, "pwd": password }));
        match self.send(rb).await {
            Ok(_) => Ok(()),
            Err(ErpError::Status {
                status: 401,
                message,
            }) => Err(ErpError::Login(
                message.unwrap_or_else(|| "invalid login credentials".into()),
            )),
            Err(e) => Err(e),
        }
    }

    /// Login name the server sees for these credentials.
    pub async fn logged_user(&self) -> Result<String> {
        let url = self.url(&["api", "method", "frappe.auth.get_logged_user"])?;
        let v = self.send(self.request(Method::GET, url)).await?;
        v.get("message")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ErpError::Decode(format!("no user in {v}")))
    }

    /// Resolve the signed-in user into a fixed identity for this run.
    pub async fn identify(&self) -> Result<StaticAuth> {
        let user = self.logged_user().await?;
        Ok(StaticAuth::new(Some(user), self.credentials.clone()))
    }

    // ─── Resources ────────────────────────────────────────────────────────

    /// `GET /api/resource/<doctype>` with filters in the query string.
    pub async fn list(&self, query: &RecordQuery) -> Result<Vec<Row>> {
        let url = self.url(&["api", "resource", &query.doctype])?;
        let rb = self.request(Method::GET, url).query(&[
            ("fields", serde_json::to_string(&query.fields)?),
            ("filters", serde_json::to_string(&query.filters)?),
            ("limit_page_length", query.limit.to_string()),
        ]);
        Ok(normalize_rows(self.send(rb).await?))
    }

    /// `POST /api/method/frappe.client.get_list` with the query as a body.
    pub async fn get_list(&self, query: &RecordQuery) -> Result<Vec<Row>> {
        let url = self.url(&["api", "method", "frappe.client.get_list"])?;
        let rb = self.request(Method::POST, url).json(&json!({
            "doctype": query.doctype,
            "filters": query.filters,
            "fields": query.fields,
            "limit_page_length": query.limit,
        }));
        Ok(normalize_rows(self.send(rb).await?))
    }

    pub async fn get_doc(&self, doctype: &str, name: &str, fields: &[&str]) -> Result<Row> {
        let url = self.url(&["api", "resource", doctype, name])?;
        let rb = self
            .request(Method::GET, url)
            .query(&[("fields", serde_json::to_string(fields)?)]);
        let v = self.send(rb).await?;
        data_object(v).ok_or_else(|| ErpError::Decode(format!("{doctype} {name}: no data")))
    }

    pub async fn insert_checkin(&self, rec: &NewCheckin) -> Result<String> {
        let url = self.url(&["api", "resource", &self.checkin_doctype])?;
        let rb = self.request(Method::POST, url).json(&checkin_body(rec));
        let v = self.send(rb).await?;
        data_object(v)
            .as_ref()
            .and_then(row_name)
            .map(str::to_string)
            .ok_or_else(|| ErpError::Decode("created record has no name".into()))
    }

    /// Multipart upload attached privately to `doctype`/`docname`.
    pub async fn upload_file(&self, doctype: &str, docname: &str, photo: &PhotoAsset) -> Result<()> {
        let url = self.url(&["api", "method", "upload_file"])?;
        let part = Part::bytes(photo.bytes().to_vec())
            .file_name(photo.file_name().to_string())
            .mime_str(photo.media_type())?;
        let form = Form::new()
            .part("file", part)
            .text("is_private", "1")
            .text("doctype", doctype.to_string())
            .text("docname", docname.to_string());
        self.send(self.request(Method::POST, url).multipart(form))
            .await?;
        Ok(())
    }

    async fn employees_where(&self, field: &str, value: &str, limit: u32) -> Result<Vec<Employee>> {
        let query = RecordQuery {
            doctype: self.employee_doctype.clone(),
            filters: vec![Filter::eq(&self.employee_doctype, field, value)],
            fields: EMPLOYEE_FIELDS.iter().map(|f| f.to_string()).collect(),
            limit,
        };
        self.list(&query)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(ErpError::from))
            .collect()
    }
}

// ─── AttendanceGateway ────────────────────────────────────────────────────

#[async_trait]
impl AttendanceGateway for ErpClient {
    async fn create(&self, record: &NewCheckin) -> std::result::Result<String, GatewayError> {
        Ok(self.insert_checkin(record).await?)
    }

    async fn query(&self, query: &RecordQuery) -> std::result::Result<Vec<Row>, GatewayError> {
        Ok(self.list(query).await?)
    }

    async fn query_structured(
        &self,
        query: &RecordQuery,
    ) -> std::result::Result<Vec<Row>, GatewayError> {
        Ok(self.get_list(query).await?)
    }

    async fn attach_file(
        &self,
        record_id: &str,
        photo: &PhotoAsset,
    ) -> std::result::Result<(), GatewayError> {
        Ok(self
            .upload_file(&self.checkin_doctype, record_id, photo)
            .await?)
    }

    async fn fetch(
        &self,
        record_id: &str,
        fields: &[&str],
    ) -> std::result::Result<Row, GatewayError> {
        Ok(self.get_doc(&self.checkin_doctype, record_id, fields).await?)
    }
}

// ─── RosterProvider ───────────────────────────────────────────────────────

/// Employee fields that may hold a login name, in lookup order.
const LOGIN_FIELDS: &[&str] = &["user_id", "personal_email", "company_email"];

#[async_trait]
impl RosterProvider for ErpClient {
    async fn resolve_supervisor(
        &self,
        user: &str,
    ) -> std::result::Result<Option<Employee>, GatewayError> {
        let mut last_err = None;
        let mut any_ok = false;
        for field in LOGIN_FIELDS {
            match self.employees_where(field, user, 1).await {
                Ok(mut found) if !found.is_empty() => return Ok(Some(found.remove(0))),
                Ok(_) => any_ok = true,
                Err(e) => {
                    warn!(field, error = %e, "supervisor lookup failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if !any_ok => Err(e.into()),
            _ => Ok(None),
        }
    }

    async fn managed_employees(
        &self,
        supervisor: &Employee,
    ) -> std::result::Result<Vec<Employee>, GatewayError> {
        let mut candidates: Vec<&str> = Vec::new();
        for c in [
            Some(supervisor.name.as_str()),
            supervisor.employee_name.as_deref(),
            supervisor.user_id.as_deref(),
            supervisor.personal_email.as_deref(),
            supervisor.company_email.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            let c = c.trim();
            if !c.is_empty() && !candidates.contains(&c) {
                candidates.push(c);
            }
        }

        let mut last_err = None;
        let mut any_ok = false;
        for candidate in candidates {
            // limit 0: every matching row
            match self.employees_where(SUPERVISOR_FIELD, candidate, 0).await {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => any_ok = true,
                Err(e) => {
                    warn!(candidate, error = %e, "managed employee lookup failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if !any_ok => Err(e.into()),
            _ => Ok(Vec::new()),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
