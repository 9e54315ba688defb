use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Insufficient training data: {rows} rows (need {required}), {classes} label class(es)")]
    InsufficientTrainingData {
        rows: usize,
        required: usize,
        classes: usize,
    },

    #[error("Model training failed: {0}")]
    ModelTrainingFailure(String),

    #[error("Model has not been trained")]
    ModelNotTrained,

    #[error("Pipeline failed for {ticker}: {source}")]
    Pipeline {
        ticker: String,
        #[source]
        source: Box<SignalError>,
    },

    #[error("Analysis failed for {ticker}: {source}")]
    Analysis {
        ticker: String,
        #[source]
        source: Box<SignalError>,
    },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Persistence error at {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SignalError {
    pub fn pipeline(ticker: &str, source: SignalError) -> Self {
        SignalError::Pipeline {
            ticker: ticker.to_string(),
            source: Box::new(source),
        }
    }

    pub fn analysis(ticker: &str, source: SignalError) -> Self {
        SignalError::Analysis {
            ticker: ticker.to_string(),
            source: Box::new(source),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        SignalError::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Stable taxonomy name, used for per-ticker batch error entries.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalError::DataUnavailable(_) => "DataUnavailable",
            SignalError::InsufficientTrainingData { .. } => "InsufficientTrainingData",
            SignalError::ModelTrainingFailure(_) => "ModelTrainingFailure",
            SignalError::ModelNotTrained => "ModelNotTrained",
            SignalError::Pipeline { .. } => "PipelineError",
            SignalError::Analysis { .. } => "AnalysisError",
            SignalError::Provider(_) => "ProviderError",
            SignalError::Persistence { .. } => "PersistenceError",
            SignalError::InvalidInput(_) => "InvalidInput",
        }
    }

    /// Innermost cause with the wrapping layers peeled off.
    pub fn root_cause(&self) -> &SignalError {
        match self {
            SignalError::Pipeline { source, .. } | SignalError::Analysis { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapping_keeps_root_cause() {
        let inner = SignalError::DataUnavailable("no bars".into());
        let err = SignalError::analysis("AAPL", SignalError::pipeline("AAPL", inner));

        assert_eq!(err.kind(), "AnalysisError");
        assert!(matches!(err.root_cause(), SignalError::DataUnavailable(_)));
        assert!(err.to_string().contains("AAPL"));
    }
}
