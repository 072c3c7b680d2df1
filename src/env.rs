//! Environment-variable configuration override, in the style of
//! `cmd_util::env::env_config`.

use std::{
    env,
    fmt::Debug,
    str::FromStr,
};

/// Parse `name` from the environment, falling back to `default` if unset,
/// non-unicode, or unparseable. Logs the effective value at `info` (an
/// override) or `warn` (a rejected override) so a misconfigured variable
/// shows up in the logs rather than failing silently.
pub fn env_config<T: Debug + FromStr>(name: &str, default: T) -> T
where
    <T as FromStr>::Err: Debug,
{
    let var_s = match env::var(name) {
        Ok(s) => s,
        Err(env::VarError::NotPresent) => return default,
        Err(env::VarError::NotUnicode(..)) => {
            tracing::warn!("Invalid value for {name}, falling back to {default:?}.");
            return default;
        },
    };
    match T::from_str(&var_s) {
        Ok(v) => {
            tracing::info!("Overriding {name} to {v:?} from environment");
            v
        },
        Err(e) => {
            tracing::warn!("Invalid value {var_s} for {name}, falling back to {default:?}: {e:?}");
            default
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_var_falls_back_to_default() {
        assert_eq!(env_config::<u32>("EFFECTUAL_TEST_DOES_NOT_EXIST", 7), 7);
    }
}
