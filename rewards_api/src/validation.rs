//! Request validation

use axum::{
    body::HttpBody,
    extract::{rejection::JsonRejection, FromRequest},
    http::Request,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer};
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

pub static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*0x[0-9a-fA-F]{40}\s*$").expect("static regex"));
pub static SIGNATURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(0x)?[0-9a-fA-F]{130}\s*$").expect("static regex"));

/// A JSON body that passed `validator` checks
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

/// Rejection type for validation errors
#[derive(Debug)]
pub enum ValidationRejection {
    JsonRejection(JsonRejection),
    ValidationError(ValidationErrors),
}

impl From<ValidationRejection> for AppError {
    fn from(rejection: ValidationRejection) -> Self {
        match rejection {
            ValidationRejection::JsonRejection(rejection) => {
                let message = match rejection {
                    JsonRejection::JsonDataError(e) => format!("Invalid request body: {}", e.body_text()),
                    JsonRejection::JsonSyntaxError(_) => "JSON syntax error".to_string(),
                    JsonRejection::MissingJsonContentType(_) => {
                        "Missing Content-Type: application/json header".to_string()
                    }
                    _ => "Bad request".to_string(),
                };
                AppError::BadRequest(message)
            }
            ValidationRejection::ValidationError(errors) => {
                let mut fields: Vec<(String, String)> = errors
                    .field_errors()
                    .into_iter()
                    .flat_map(|(field, errs)| {
                        errs.iter().map(move |e| {
                            let message = e
                                .message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| "Invalid value".to_string());
                            (field.to_string(), message)
                        })
                    })
                    .collect();
                fields.sort();
                match fields.into_iter().next() {
                    Some((field, message)) => AppError::ValidationError { field, message },
                    None => AppError::BadRequest("Invalid request".to_string()),
                }
            }
        }
    }
}

impl IntoResponse for ValidationRejection {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

#[axum::async_trait]
impl<T, S, B> FromRequest<S, B> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
{
    type Rejection = ValidationRejection;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidationRejection::JsonRejection)?;

        value
            .validate()
            .map_err(ValidationRejection::ValidationError)?;

        Ok(ValidatedJson(value))
    }
}

/// Accept integer timestamps sent either as JSON numbers or strings
pub fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Ok(v as i64),
        Raw::Float(_) => Err(de::Error::custom("issuedAt must be an integer")),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom("issuedAt must be an integer")),
    }
}

/// Signed claim request shared by the whitelist and points programs
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    #[validate(regex(path = "ADDRESS_RE", message = "must be a 0x-prefixed 20-byte hex address"))]
    pub address: String,

    #[validate(regex(path = "SIGNATURE_RE", message = "must be a 65-byte hex signature"))]
    pub signature: String,

    #[serde(deserialize_with = "int_or_string")]
    #[validate(range(min = 1, message = "must be a positive millisecond timestamp"))]
    pub issued_at: i64,

    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "must be 1-128 characters"))]
    pub season_id: Option<String>,
}

/// Dry-run selector: one address, or a page of the population
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DryRunRequest {
    #[validate(regex(path = "ADDRESS_RE", message = "must be a 0x-prefixed 20-byte hex address"))]
    pub address: Option<String>,

    #[serde(default)]
    pub offset: Option<usize>,

    #[serde(default)]
    #[validate(range(min = 1, max = 500, message = "must be between 1 and 500"))]
    pub limit: Option<usize>,
}
