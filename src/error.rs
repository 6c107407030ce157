use jni::JNIEnv;
use thiserror::Error;

/// Location bridge error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginError {
    #[error("Plugin not installed")]
    NotInstalled,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for plugin operations
pub type PResult<T> = Result<T, PluginError>;

impl From<jni::errors::Error> for PluginError {
    fn from(err: jni::errors::Error) -> Self {
        PluginError::JniError(err.to_string())
    }
}

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &PluginError) -> PResult<()> {
    let exception_class = match error {
        PluginError::NotInstalled => "java/lang/IllegalStateException",
        PluginError::InvalidParameters(_) | PluginError::InvalidConfig(_) => {
            "java/lang/IllegalArgumentException"
        }
        PluginError::JniError(_) | PluginError::Internal(_) => "java/lang/RuntimeException",
    };

    let message = error.to_string();
    env.throw_new(exception_class, message)
        .map_err(|_| PluginError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(PluginError::NotInstalled.to_string(), "Plugin not installed");
        assert_eq!(
            PluginError::InvalidParameters("interval must be positive".to_string()).to_string(),
            "Invalid parameters: interval must be positive"
        );
    }
}
