use crate::{error::FetchError, types::Token};

/// Resolves the token configured for an account by variable name.
pub trait SecretsProvider {
    fn resolve(&self, var_name: &str) -> Result<Token, FetchError>;
}

/// Reads tokens from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretsProvider for EnvSecrets {
    fn resolve(&self, var_name: &str) -> Result<Token, FetchError> {
        if var_name.trim().is_empty() {
            return Err(FetchError::MissingToken("<unset>".to_string()));
        }

        match std::env::var(var_name) {
            Ok(value) if !value.trim().is_empty() => Ok(Token::new(value.trim())),
            _ => Err(FetchError::MissingToken(var_name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_variable_is_missing_token() {
        let err = EnvSecrets
            .resolve("PRDASH_TEST_DEFINITELY_UNSET_VAR")
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::MissingToken("PRDASH_TEST_DEFINITELY_UNSET_VAR".to_string())
        );
    }

    #[test]
    fn test_empty_name_is_missing_token() {
        assert!(matches!(
            EnvSecrets.resolve("  "),
            Err(FetchError::MissingToken(_))
        ));
    }
}
