//! Line commands read from stdin while a target runs

/// One parsed stdin command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand {
    Resume,
    StepInto,
    StepOver,
    StepReturn,
    Suspend,
    Backtrace,
    Evaluate(String),
    AddBreakpoint { file: String, line: u32 },
    RemoveBreakpoint { file: String, line: u32 },
    Scripts,
    Quit,
    Help,
}

pub const HELP: &str = "\
commands:
  c              resume
  s              step into
  n              step over
  o              step return
  p              suspend
  bt             backtrace
  e <expr>       evaluate in the top frame
  b FILE:LINE    add breakpoint
  d FILE:LINE    remove breakpoint
  scripts        list loaded scripts
  q              terminate and exit";

/// Parse one input line; blank lines yield `Ok(None)`
pub fn parse_line(line: &str) -> Result<Option<LineCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "c" => LineCommand::Resume,
        "s" => LineCommand::StepInto,
        "n" => LineCommand::StepOver,
        "o" => LineCommand::StepReturn,
        "p" => LineCommand::Suspend,
        "bt" => LineCommand::Backtrace,
        "scripts" => LineCommand::Scripts,
        "q" => LineCommand::Quit,
        "h" | "help" | "?" => LineCommand::Help,
        "e" if rest.is_empty() => return Err("usage: e <expr>".to_string()),
        "e" => LineCommand::Evaluate(rest.to_string()),
        "b" | "d" => {
            let (file, line) = parse_location(rest)?;
            if word == "b" {
                LineCommand::AddBreakpoint { file, line }
            } else {
                LineCommand::RemoveBreakpoint { file, line }
            }
        }
        other => return Err(format!("unknown command '{}' (h for help)", other)),
    };
    Ok(Some(command))
}

/// Parse `FILE:LINE` with a 1-based line
pub fn parse_location(value: &str) -> Result<(String, u32), String> {
    let (file, line) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected FILE:LINE, got '{}'", value))?;
    if file.is_empty() {
        return Err(format!("missing file in '{}'", value));
    }
    let line: u32 = line
        .parse()
        .map_err(|_| format!("invalid line number '{}'", line))?;
    if line == 0 {
        return Err("line numbers start at 1".to_string());
    }
    Ok((file.to_string(), line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        let cases = [
            ("c", LineCommand::Resume),
            ("s", LineCommand::StepInto),
            ("n", LineCommand::StepOver),
            ("o", LineCommand::StepReturn),
            ("p", LineCommand::Suspend),
            ("bt", LineCommand::Backtrace),
            ("scripts", LineCommand::Scripts),
            ("  q  ", LineCommand::Quit),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_line(input), Ok(Some(expected)), "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_evaluate_keeps_expression_text() {
        assert_eq!(
            parse_line("e  a.b[0] + f(1, 2) "),
            Ok(Some(LineCommand::Evaluate("a.b[0] + f(1, 2)".to_string())))
        );
        assert!(parse_line("e").is_err());
    }

    #[test]
    fn test_parse_breakpoint_commands() {
        assert_eq!(
            parse_line("b lib/util.js:14"),
            Ok(Some(LineCommand::AddBreakpoint {
                file: "lib/util.js".to_string(),
                line: 14
            }))
        );
        assert_eq!(
            parse_line("d C:\\app\\main.js:3"),
            Ok(Some(LineCommand::RemoveBreakpoint {
                file: "C:\\app\\main.js".to_string(),
                line: 3
            }))
        );
        assert!(parse_line("b main.js").is_err());
        assert!(parse_line("b main.js:0").is_err());
        assert!(parse_line("b :4").is_err());
    }

    #[test]
    fn test_blank_and_unknown_lines() {
        assert_eq!(parse_line("   "), Ok(None));
        assert!(parse_line("jump 4").unwrap_err().contains("jump"));
    }
}
