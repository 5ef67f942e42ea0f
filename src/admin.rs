//! Authenticated administration surface. Every call goes through
//! [`SessionManager::request`] and inherits its refresh-and-retry handling.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::api::{AdminRequest, MultipartSpec, encode_segment};
use crate::error::ApiError;
use crate::models::{
    Candidate, Election, ElectionResults, ElectionStats, SendReport, StatsPayload, Uid, Voter,
    datetime,
};
use crate::session::SessionManager;

/// Starter roster file offered by the voters screen.
pub const CSV_TEMPLATE: &str = "email\nadmin@example.com\nvoter1@example.com\nvoter2@example.com";

/// Fields for creating or replacing an election.
#[derive(Debug, Clone)]
pub struct ElectionForm {
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl ElectionForm {
    /// Rejected forms never reach the network.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::Validation("election title is required".into()));
        }
        if self.start_at >= self.end_at {
            return Err(ApiError::Validation(
                "the voting window must end after it starts".into(),
            ));
        }
        Ok(())
    }

    fn payload(&self) -> serde_json::Value {
        json!({
            "title": self.title.trim(),
            "start_at": datetime::format_backend(&self.start_at),
            "end_at": datetime::format_backend(&self.end_at),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CandidateForm {
    pub name: String,
    pub prenom: String,
    pub photo: Option<PhotoUpload>,
}

impl CandidateForm {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() || self.prenom.trim().is_empty() {
            return Err(ApiError::Validation(
                "candidate name and given name are required".into(),
            ));
        }
        Ok(())
    }

    fn form(&self) -> MultipartSpec {
        let mut spec = MultipartSpec::new()
            .text("name", self.name.trim())
            .text("prenom", self.prenom.trim());
        if let Some(photo) = &self.photo {
            spec = spec.file(
                "photo",
                photo.file_name.clone(),
                photo_mime(&photo.file_name),
                photo.bytes.clone(),
            );
        }
        spec
    }
}

fn photo_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit('.')
        .next()
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub async fn list_elections(session: &SessionManager) -> Result<Vec<Election>, ApiError> {
    session
        .request(AdminRequest::get("/admin/elections"))
        .await?
        .json()
}

pub async fn create_election(
    session: &SessionManager,
    form: &ElectionForm,
) -> Result<(), ApiError> {
    form.validate()?;
    session
        .request(AdminRequest::post("/admin/elections", form.payload()))
        .await?;
    Ok(())
}

pub async fn update_election(
    session: &SessionManager,
    election: &Uid,
    form: &ElectionForm,
) -> Result<(), ApiError> {
    form.validate()?;
    session
        .request(AdminRequest::patch(
            format!("/admin/elections/{election}"),
            form.payload(),
        ))
        .await?;
    Ok(())
}

pub async fn delete_election(session: &SessionManager, election: &Uid) -> Result<(), ApiError> {
    session
        .request(AdminRequest::delete(format!("/admin/elections/{election}")))
        .await?;
    Ok(())
}

/// Opens the voting window right away, regardless of `start_at`.
pub async fn start_election(session: &SessionManager, election: &Uid) -> Result<(), ApiError> {
    session
        .request(AdminRequest::post_empty(format!(
            "/admin/elections/{election}/start"
        )))
        .await?;
    Ok(())
}

pub async fn stop_election(session: &SessionManager, election: &Uid) -> Result<(), ApiError> {
    session
        .request(AdminRequest::post_empty(format!(
            "/admin/elections/{election}/stop"
        )))
        .await?;
    Ok(())
}

pub async fn list_candidates(
    session: &SessionManager,
    election: &Uid,
) -> Result<Vec<Candidate>, ApiError> {
    session
        .request(AdminRequest::get(format!(
            "/admin/elections/{election}/candidates"
        )))
        .await?
        .json()
}

pub async fn add_candidate(
    session: &SessionManager,
    election: &Uid,
    form: &CandidateForm,
) -> Result<(), ApiError> {
    form.validate()?;
    session
        .request(AdminRequest::multipart(
            format!("/admin/elections/{election}/candidates"),
            form.form(),
        ))
        .await?;
    Ok(())
}

pub async fn delete_candidate(
    session: &SessionManager,
    election: &Uid,
    candidate: &Uid,
) -> Result<(), ApiError> {
    session
        .request(AdminRequest::delete(format!(
            "/admin/elections/{election}/candidates/{candidate}"
        )))
        .await?;
    Ok(())
}

pub async fn list_votants(
    session: &SessionManager,
    election: &Uid,
) -> Result<Vec<Voter>, ApiError> {
    session
        .request(AdminRequest::get(format!(
            "/admin/elections/{election}/votants"
        )))
        .await?
        .json()
}

/// Removes one roster entry. The identifier (usually an e-mail address) is
/// escaped before being embedded in the path.
pub async fn delete_votant(
    session: &SessionManager,
    election: &Uid,
    identifier: &str,
) -> Result<(), ApiError> {
    session
        .request(AdminRequest::delete(format!(
            "/admin/elections/{election}/votants/{}",
            encode_segment(identifier)
        )))
        .await?;
    Ok(())
}

/// Uploads a roster CSV; the backend creates one voting token per row.
pub async fn import_tokens_csv(
    session: &SessionManager,
    election: &Uid,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<SendReport, ApiError> {
    let form = MultipartSpec::new().file("file", file_name, "text/csv", bytes);
    session
        .request(AdminRequest::multipart(
            format!("/admin/elections/{election}/tokens/create/csv"),
            form,
        ))
        .await?
        .json()
}

pub async fn create_token_email(
    session: &SessionManager,
    election: &Uid,
    email: &str,
) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::Validation("an e-mail address is required".into()));
    }
    session
        .request(AdminRequest::post(
            format!("/admin/elections/{election}/tokens/create/email"),
            json!({ "email": email }),
        ))
        .await?;
    Ok(())
}

pub async fn create_token_phone(
    session: &SessionManager,
    election: &Uid,
    phone: &str,
) -> Result<(), ApiError> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(ApiError::Validation("a phone number is required".into()));
    }
    session
        .request(AdminRequest::post(
            format!("/admin/elections/{election}/tokens/create/phone"),
            json!({ "phone": phone }),
        ))
        .await?;
    Ok(())
}

/// Mails every voter that has not been mailed yet.
pub async fn send_tokens(
    session: &SessionManager,
    election: &Uid,
) -> Result<SendReport, ApiError> {
    session
        .request(AdminRequest::post(
            format!("/admin/elections/{election}/tokens/send"),
            json!({}),
        ))
        .await?
        .json()
}

/// Re-mails the whole roster, including voters already contacted.
pub async fn send_tokens_all(
    session: &SessionManager,
    election: &Uid,
) -> Result<SendReport, ApiError> {
    session
        .request(AdminRequest::post(
            format!("/admin/elections/{election}/tokens/send/all"),
            json!({}),
        ))
        .await?
        .json()
}

pub async fn results(
    session: &SessionManager,
    election: &Uid,
) -> Result<ElectionResults, ApiError> {
    session
        .request(AdminRequest::get(format!(
            "/admin/elections/{election}/results"
        )))
        .await?
        .json()
}

pub async fn stats(session: &SessionManager) -> Result<Vec<ElectionStats>, ApiError> {
    let payload: StatsPayload = session
        .request(AdminRequest::get("/admin/stats"))
        .await?
        .json()?;
    Ok(payload.into_vec())
}
