use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkiffError>;

#[derive(Error, Debug)]
pub enum SkiffError {
    #[error("resource {path} not found")]
    NotFound { path: String },

    #[error("unable to access {resource}: {details}")]
    Access { resource: String, details: String },

    #[error("delete failed for {path}: {details}")]
    Delete { path: String, details: String },

    #[error("render failed: {0}")]
    Render(String),

    #[error("no valid selector found on service {path}")]
    Selector { path: String },

    #[error("missing {key} in request context")]
    Context { key: &'static str },

    #[error("malformed payload: {0}")]
    Type(String),

    #[error("log stream failed for {path}: {details}")]
    Stream { path: String, details: String },

    #[error("unable to marshal resource: {0}")]
    Marshal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SkiffError {
    pub fn access(resource: impl Into<String>, details: impl ToString) -> Self {
        Self::Access {
            resource: resource.into(),
            details: details.to_string(),
        }
    }

    pub fn render(details: impl Into<String>) -> Self {
        Self::Render(details.into())
    }

    pub fn type_error(details: impl Into<String>) -> Self {
        Self::Type(details.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for SkiffError {
    fn from(error: serde_json::Error) -> Self {
        Self::Type(error.to_string())
    }
}

impl From<serde_yaml::Error> for SkiffError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Marshal(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::SkiffError;

    #[test]
    fn messages_name_the_offending_resource() {
        let error = SkiffError::Selector {
            path: "default/web".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "no valid selector found on service default/web"
        );

        let error = SkiffError::Context { key: "dir" };
        assert_eq!(error.to_string(), "missing dir in request context");
        assert!(!error.is_not_found());
    }

    #[test]
    fn json_errors_surface_as_type_errors() {
        let error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(SkiffError::from(error), SkiffError::Type(_)));
    }
}
