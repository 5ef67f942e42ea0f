use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Datetime handling for the backend wire formats.
///
/// Reads accept RFC 3339 with or without offset as well as the backend's
/// space-separated format; naive timestamps are taken as UTC. Writes always
/// use the space-separated format, which is the only one the backend accepts
/// on election creation.
pub mod datetime {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const BACKEND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }
        None
    }

    pub fn format_backend(value: &DateTime<Utc>) -> String {
        value.format(BACKEND_FORMAT).to_string()
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_backend(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized datetime `{raw}`")))
    }
}

/// Identifier as the backend emits it: numeric in some deployments, string
/// (UUID or slug) in others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Uid {
    Num(i64),
    Text(String),
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uid::Num(n) => write!(f, "{n}"),
            Uid::Text(s) => f.write_str(s),
        }
    }
}

// Sole string entry point, so clap derive resolves CLI arguments through it:
// numeric input must land on `Num` to compare equal to numeric wire ids. A
// blanket `From<&str>`/`From<String>` would shadow it in clap's value-parser
// selection and force every argument to `Text`.
impl FromStr for Uid {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(match raw.parse::<i64>() {
            Ok(n) => Uid::Num(n),
            Err(_) => Uid::Text(raw.to_string()),
        })
    }
}

/// The backend has shipped several names for record identifiers. This is the
/// one place that resolves them; slots are tried in priority order.
fn first_uid(slots: [Option<Uid>; 3], what: &str) -> Result<Uid, String> {
    slots
        .into_iter()
        .flatten()
        .next()
        .ok_or_else(|| format!("{what} record is missing an identifier"))
}

/// Access/refresh pair granted by login. Both halves are required: a session
/// without a refresh token cannot outlive its access token and is not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Raw token response. Login requires both tokens; refresh may omit the
/// refresh token when the backend does not rotate it.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ElectionWire {
    uid: Option<Uid>,
    id: Option<Uid>,
    election_uid: Option<Uid>,
    #[serde(default)]
    title: String,
    #[serde(with = "datetime")]
    start_at: DateTime<Utc>,
    #[serde(with = "datetime")]
    end_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ElectionWire")]
pub struct Election {
    pub uid: Uid,
    pub title: String,
    #[serde(with = "datetime")]
    pub start_at: DateTime<Utc>,
    #[serde(with = "datetime")]
    pub end_at: DateTime<Utc>,
}

impl TryFrom<ElectionWire> for Election {
    type Error = String;

    fn try_from(wire: ElectionWire) -> Result<Self, Self::Error> {
        Ok(Election {
            uid: first_uid([wire.uid, wire.id, wire.election_uid], "election")?,
            title: wire.title,
            start_at: wire.start_at,
            end_at: wire.end_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    Scheduled,
    Open,
    Closed,
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElectionStatus::Scheduled => "scheduled",
            ElectionStatus::Open => "open",
            ElectionStatus::Closed => "closed",
        })
    }
}

impl Election {
    /// Status is derived client-side from the voting window, never read from
    /// a server field. The window is half-open: an election is live at
    /// `start_at` and no longer live at `end_at`.
    pub fn status_at(&self, now: DateTime<Utc>) -> ElectionStatus {
        if now < self.start_at {
            ElectionStatus::Scheduled
        } else if now < self.end_at {
            ElectionStatus::Open
        } else {
            ElectionStatus::Closed
        }
    }
}

/// Voting window as exposed on the public ballot payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ElectionWindow {
    #[serde(with = "datetime")]
    pub start_at: DateTime<Utc>,
    #[serde(with = "datetime")]
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CandidateWire {
    id: Option<Uid>,
    uid: Option<Uid>,
    candidate_uid: Option<Uid>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    prenom: String,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    votes: i64,
}

/// `name` is the family name, `prenom` the given name; field names mirror
/// the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CandidateWire")]
pub struct Candidate {
    pub id: Uid,
    pub name: String,
    pub prenom: String,
    pub photo: Option<String>,
    pub description: Option<String>,
    pub votes: i64,
}

impl TryFrom<CandidateWire> for Candidate {
    type Error = String;

    fn try_from(wire: CandidateWire) -> Result<Self, Self::Error> {
        Ok(Candidate {
            id: first_uid([wire.id, wire.uid, wire.candidate_uid], "candidate")?,
            name: wire.name,
            prenom: wire.prenom,
            photo: wire.photo,
            description: wire.description,
            votes: wire.votes,
        })
    }
}

impl Candidate {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.prenom, self.name).trim().to_string()
    }
}

/// Roster entry. `is_active` is true while the voter has not cast a ballot;
/// `mailed` records whether a token e-mail went out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    pub email: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub mailed: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ResultRowWire {
    candidate_uid: Option<Uid>,
    id: Option<Uid>,
    uid: Option<Uid>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    prenom: String,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    vote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ResultRowWire")]
pub struct ResultRow {
    pub candidate_uid: Uid,
    pub name: String,
    pub prenom: String,
    pub photo: Option<String>,
    pub vote_count: i64,
}

impl TryFrom<ResultRowWire> for ResultRow {
    type Error = String;

    fn try_from(wire: ResultRowWire) -> Result<Self, Self::Error> {
        Ok(ResultRow {
            candidate_uid: first_uid([wire.candidate_uid, wire.id, wire.uid], "result")?,
            name: wire.name,
            prenom: wire.prenom,
            photo: wire.photo,
            vote_count: wire.vote_count,
        })
    }
}

impl ResultRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.prenom, self.name).trim().to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElectionResults {
    #[serde(default)]
    pub election: Option<Election>,
    #[serde(default)]
    pub results: Vec<ResultRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionStats {
    pub election_uid: Uid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub total_voters: i64,
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(default)]
    pub votes_cast: i64,
    #[serde(default)]
    pub total_candidates: i64,
    #[serde(default)]
    pub participation_rate: f64,
}

/// The stats endpoint has returned both a bare object and an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StatsPayload {
    Many(Vec<ElectionStats>),
    One(ElectionStats),
}

impl StatsPayload {
    pub fn into_vec(self) -> Vec<ElectionStats> {
        match self {
            StatsPayload::Many(list) => list,
            StatsPayload::One(one) => vec![one],
        }
    }
}

/// Payload served to a voting token before the ballot is cast.
#[derive(Debug, Clone, Deserialize)]
pub struct BallotPayload {
    pub election: ElectionWindow,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Counters returned by the token creation and sending endpoints, which
/// disagree on the field name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent: Option<i64>,
}

impl SendReport {
    pub fn count(&self) -> i64 {
        self.created.or(self.sent).unwrap_or(0)
    }
}
