//! Restricted evaluator for Tier-3 specialist recovery and the math
//! generator's worked examples. The upstream implementation embeds a
//! restricted interpreter with a module whitelist; this core instead
//! whitelists a small expression grammar directly (no `eval`, no embedded
//! scripting engine) per SPEC_FULL.md section 9's ambient note — a strictly
//! narrower attack surface than shelling out to a real interpreter.

use crate::error::CoreError;
use std::time::{Duration, Instant};

const WALL_CLOCK_LIMIT: Duration = Duration::from_secs(5);
const OUTPUT_LIMIT_BYTES: usize = 4096;

/// A whitelisted ticker-string transform, the only kind of "code" Tier-3
/// repair or the math generator may produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerTransform {
    AppendSuffix(String),
    StripSuffix(String),
    SwapExchangeSuffix { from: String, to: String },
    Uppercase,
    Lowercase,
}

/// Parses a restricted expression of the form `op("arg")` or
/// `op("arg1","arg2")` into a `TickerTransform`. Anything else is rejected.
pub fn parse_transform(expr: &str) -> Result<TickerTransform, CoreError> {
    let expr = expr.trim();
    let deadline = Instant::now();

    let open = expr.find('(').ok_or_else(|| CoreError::SandboxDenied("missing '('".into()))?;
    let close = expr
        .rfind(')')
        .ok_or_else(|| CoreError::SandboxDenied("missing ')'".into()))?;
    if close < open {
        return Err(CoreError::SandboxDenied("malformed expression".into()));
    }
    let op = &expr[..open];
    let args_raw = &expr[open + 1..close];
    let args: Vec<String> = args_raw
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if deadline.elapsed() > WALL_CLOCK_LIMIT {
        return Err(CoreError::SandboxDenied("wall-clock limit exceeded".into()));
    }

    match op {
        "append_suffix" if args.len() == 1 => Ok(TickerTransform::AppendSuffix(args[0].clone())),
        "strip_suffix" if args.len() == 1 => Ok(TickerTransform::StripSuffix(args[0].clone())),
        "swap_exchange_suffix" if args.len() == 2 => {
            Ok(TickerTransform::SwapExchangeSuffix { from: args[0].clone(), to: args[1].clone() })
        }
        "uppercase" if args.is_empty() => Ok(TickerTransform::Uppercase),
        "lowercase" if args.is_empty() => Ok(TickerTransform::Lowercase),
        other => Err(CoreError::SandboxDenied(format!("'{other}' is not a whitelisted operation"))),
    }
}

/// Applies a parsed transform to `input`, enforcing the output-size limit.
pub fn apply_transform(transform: &TickerTransform, input: &str) -> Result<String, CoreError> {
    let output = match transform {
        TickerTransform::AppendSuffix(suffix) => format!("{input}{suffix}"),
        TickerTransform::StripSuffix(suffix) => input.strip_suffix(suffix.as_str()).unwrap_or(input).to_string(),
        TickerTransform::SwapExchangeSuffix { from, to } => {
            if let Some(stem) = input.strip_suffix(from.as_str()) {
                format!("{stem}{to}")
            } else {
                input.to_string()
            }
        }
        TickerTransform::Uppercase => input.to_ascii_uppercase(),
        TickerTransform::Lowercase => input.to_ascii_lowercase(),
    };
    if output.len() > OUTPUT_LIMIT_BYTES {
        return Err(CoreError::SandboxDenied("output exceeds 4KiB limit".into()));
    }
    Ok(output)
}

/// Parses and applies in one step, as Tier-3 recovery does with an LLM's
/// `{reasoning, code}` reply.
pub fn run(expr: &str, input: &str) -> Result<String, CoreError> {
    let transform = parse_transform(expr)?;
    apply_transform(&transform, input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_suffix_transform() {
        assert_eq!(run(r#"append_suffix(".L")"#, "LLOY").unwrap(), "LLOY.L");
    }

    #[test]
    fn swap_exchange_suffix_transform() {
        assert_eq!(run(r#"swap_exchange_suffix(".L",".DE")"#, "SAP.L").unwrap(), "SAP.DE");
    }

    #[test]
    fn disallowed_operation_is_sandbox_denied() {
        let result = run("import_os()", "AAPL");
        assert!(matches!(result, Err(CoreError::SandboxDenied(_))));
    }

    #[test]
    fn malformed_expression_rejected() {
        assert!(run("not_an_expression", "AAPL").is_err());
    }

    #[test]
    fn oversized_output_rejected() {
        let huge = "X".repeat(5000);
        let result = apply_transform(&TickerTransform::AppendSuffix(huge), "A");
        assert!(matches!(result, Err(CoreError::SandboxDenied(_))));
    }
}
