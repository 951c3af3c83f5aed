//! Built-in resources.

pub mod command;
pub mod package;
pub mod postgres;
pub mod processes;
pub mod service;

use crate::resource::ResourceError;
use hostspec_profile::Value;

/// Check the argument count against `min..=max`.
pub(crate) fn expect_arity(
    args: &[Value],
    min: usize,
    max: usize,
    usage: &str,
) -> Result<(), ResourceError> {
    if args.len() < min || args.len() > max {
        return Err(ResourceError::InvalidArguments(format!(
            "expected {}, got {} argument(s)",
            usage,
            args.len()
        )));
    }
    Ok(())
}

/// Non-empty text argument.
pub(crate) fn text_arg(args: &[Value], index: usize, name: &str) -> Result<String, ResourceError> {
    match args.get(index) {
        Some(Value::Text(s)) if !s.is_empty() => Ok(s.clone()),
        Some(other) => Err(ResourceError::InvalidArguments(format!(
            "{} must be non-empty text, got {}",
            name,
            other.type_name()
        ))),
        None => Err(ResourceError::InvalidArguments(format!("{} is required", name))),
    }
}

/// TCP port given as a number or numeric text.
pub(crate) fn port_arg(args: &[Value], index: usize) -> Result<u16, ResourceError> {
    let port = match args.get(index) {
        Some(Value::Int(p)) => u16::try_from(*p).ok(),
        Some(Value::Text(s)) => s.trim().parse::<u16>().ok(),
        _ => None,
    };
    port.filter(|p| *p != 0)
        .ok_or_else(|| ResourceError::InvalidArguments("port must be in 1..=65535".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_helpers() {
        let args = vec![Value::from("postgres"), Value::from(5432u16), Value::from("5433")];
        assert!(expect_arity(&args, 1, 3, "x(a, b, c)").is_ok());
        assert!(expect_arity(&args, 4, 5, "x(a, b, c, d)").is_err());

        assert_eq!(text_arg(&args, 0, "user").unwrap(), "postgres");
        assert!(text_arg(&args, 1, "user").is_err());
        assert!(text_arg(&args, 9, "user").is_err());

        assert_eq!(port_arg(&args, 1).unwrap(), 5432);
        assert_eq!(port_arg(&args, 2).unwrap(), 5433);
        assert!(port_arg(&[Value::Int(70000)], 0).is_err());
        assert!(port_arg(&[Value::Int(0)], 0).is_err());
    }
}
