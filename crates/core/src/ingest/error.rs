use std::fmt;

/// Anything that went wrong while talking to one of the upstream data providers.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{provider}: {var} is not configured")]
    MissingCredential {
        provider: &'static str,
        var: &'static str,
    },

    #[error("{provider} {stage} request failed: {detail}")]
    Transport {
        provider: &'static str,
        stage: &'static str,
        detail: String,
    },

    #[error("{provider} {stage} HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        stage: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} {stage} payload could not be decoded: {detail}")]
    Decode {
        provider: &'static str,
        stage: &'static str,
        detail: String,
        body: String,
    },

    /// The provider answered with a well-formed payload that says it has no data for us.
    #[error("{provider}: {message}")]
    Reported {
        provider: &'static str,
        message: String,
    },

    #[error("{}", Joined(.0))]
    Combined(Vec<SourceError>),
}

impl SourceError {
    /// The request URL is dropped from the detail: Finnhub and Alpha Vantage carry their
    /// credential in the query string.
    pub fn transport(provider: &'static str, stage: &'static str, err: reqwest::Error) -> Self {
        Self::Transport {
            provider,
            stage,
            detail: err.without_url().to_string(),
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            Self::MissingCredential { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Status { provider, .. }
            | Self::Decode { provider, .. }
            | Self::Reported { provider, .. } => provider,
            Self::Combined(errs) => errs.first().map(|e| e.provider()).unwrap_or("unknown"),
        }
    }

    /// Raw upstream body kept for diagnostics, when there is one.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } | Self::Decode { body, .. } => Some(body),
            _ => None,
        }
    }
}

struct Joined<'a>(&'a [SourceError]);

impl fmt::Display for Joined<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}
