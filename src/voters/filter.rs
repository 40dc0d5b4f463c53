//! Typed voter filtering.
//!
//! A [`VoterFilter`] names every supported criterion explicitly; [`VoterQuery`]
//! turns it into a `WHERE` clause with bound parameters. Column names come only
//! from [`Election::column`], never from request input.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Election {
    V20State,
    V21Town,
    V21Primary,
    V22General,
    V23Town,
}

impl Election {
    pub const ALL: [Election; 5] = [
        Election::V20State,
        Election::V21Town,
        Election::V21Primary,
        Election::V22General,
        Election::V23Town,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Self::V20State => "v20state",
            Self::V21Town => "v21town",
            Self::V21Primary => "v21primary",
            Self::V22General => "v22general",
            Self::V23Town => "v23town",
        }
    }
}

impl fmt::Display for Election {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Election {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Election::ALL
            .into_iter()
            .find(|e| e.column().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::BadRequest(format!("Unknown election: {}", s)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoterFilter {
    pub party: Option<String>,
    pub min_birth_year: Option<i32>,
    pub max_birth_year: Option<i32>,
    pub voter_score: Option<i64>,
    /// Voter must have taken part in every listed election
    pub elections: Vec<Election>,
}

/// Query-string form of a filter. `elections` may repeat and each value may
/// itself be comma separated; `party_affiliation` is accepted for `party`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoterParams {
    pub party: Option<String>,
    pub min_dob: Option<i32>,
    pub max_dob: Option<i32>,
    pub voter_score: Option<i64>,
    pub elections: Vec<String>,
    pub page: Option<u32>,
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<Option<T>, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("{} must be a number", key)))
}

impl VoterParams {
    /// Build from decoded query pairs; unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, AppError> {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "party" | "party_affiliation" => params.party = Some(value),
                "min_dob" => params.min_dob = parse_number(&key, &value)?,
                "max_dob" => params.max_dob = parse_number(&key, &value)?,
                "voter_score" => params.voter_score = parse_number(&key, &value)?,
                "page" => params.page = parse_number(&key, &value)?,
                "elections" => params.elections.push(value),
                _ => {}
            }
        }
        Ok(params)
    }
}

impl TryFrom<&VoterParams> for VoterFilter {
    type Error = AppError;

    fn try_from(params: &VoterParams) -> Result<Self, Self::Error> {
        let mut elections = Vec::new();
        for name in params
            .elections
            .iter()
            .flat_map(|list| list.split(','))
            .filter(|s| !s.trim().is_empty())
        {
            let election: Election = name.parse()?;
            if !elections.contains(&election) {
                elections.push(election);
            }
        }

        if let (Some(min), Some(max)) = (params.min_dob, params.max_dob) {
            if min > max {
                return Err(AppError::BadRequest(
                    "min_dob must not be after max_dob".into(),
                ));
            }
        }

        Ok(VoterFilter {
            party: params
                .party
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            min_birth_year: params.min_dob,
            max_birth_year: params.max_dob,
            voter_score: params.voter_score,
            elections,
        })
    }
}

/// SQL fragment plus its bound values.
#[derive(Debug, Clone, Default)]
pub struct VoterQuery {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl VoterQuery {
    pub fn from_filter(filter: &VoterFilter) -> Self {
        let mut query = Self::default();

        if let Some(party) = &filter.party {
            query.push("party_affiliation = ?", Value::Text(party.clone()));
        }
        // Dates are stored as YYYY-MM-DD, so year bounds are plain string bounds
        if let Some(year) = filter.min_birth_year {
            query.push("date_of_birth >= ?", Value::Text(format!("{:04}-01-01", year)));
        }
        if let Some(year) = filter.max_birth_year {
            query.push("date_of_birth <= ?", Value::Text(format!("{:04}-12-31", year)));
        }
        if let Some(score) = filter.voter_score {
            query.push("voter_score = ?", Value::Integer(score));
        }
        for election in &filter.elections {
            query.clauses.push(format!("{} = 1", election.column()));
        }

        query
    }

    fn push(&mut self, clause: &str, value: Value) {
        self.clauses.push(clause.to_string());
        self.params.push(value);
    }

    /// `" WHERE a AND b"`, or empty when the filter is empty
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}
