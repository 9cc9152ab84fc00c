use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AxError {
    #[error("element no longer refers to a live window")]
    InvalidElement,
    #[error("application could not complete the request")]
    CannotComplete,
    #[error("attribute is not supported by this element")]
    AttributeUnsupported,
    #[error("attribute has no value")]
    NoValue,
    #[error("element does not implement the request")]
    NotImplemented,
    #[error("accessibility API is disabled for this process")]
    ApiDisabled,
    #[error("value had an unexpected type")]
    NotFound,
    #[error("accessibility call failed with code {0}")]
    Other(i32),
}

impl AxError {
    /// Whether the handle that produced this error should be treated as gone.
    pub fn is_dead(&self) -> bool { matches!(self, AxError::InvalidElement) }
}

#[cfg(target_os = "macos")]
mod status {
    use objc2_application_services::AXError;

    use super::AxError;

    impl AxError {
        /// Converts an accessibility status into `Ok(())` or the matching error.
        pub fn check(status: AXError) -> Result<(), AxError> {
            match status {
                AXError::Success => Ok(()),
                other => Err(other.into()),
            }
        }
    }

    impl From<AXError> for AxError {
        fn from(status: AXError) -> Self {
            match status {
                AXError::InvalidUIElement => AxError::InvalidElement,
                AXError::CannotComplete => AxError::CannotComplete,
                AXError::AttributeUnsupported | AXError::ParameterizedAttributeUnsupported => {
                    AxError::AttributeUnsupported
                }
                AXError::NoValue => AxError::NoValue,
                AXError::APIDisabled => AxError::ApiDisabled,
                AXError::NotImplemented => AxError::NotImplemented,
                other => AxError::Other(other.0),
            }
        }
    }

}
