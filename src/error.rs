use thiserror::Error;

/// Why a single listing entry could not be turned into a record.
/// Always record-local: the caller logs it and moves on.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("unparseable listing gain {0:?}")]
    MalformedGain(String),

    #[error("unparseable close date {0:?}")]
    MalformedDate(String),

    #[error("bad detail link {0:?}")]
    BadLink(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} rejected the message ({status}): {body}")]
    Rejected {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} is missing {field}")]
    MissingCredential {
        provider: &'static str,
        field: &'static str,
    },
}
