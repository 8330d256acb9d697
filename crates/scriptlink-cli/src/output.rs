//! One-line renderings of host events and inspection results

use scriptlink_debug::{ConsoleEvent, HostEvent, RunEvent, Script, StackFrame};

pub fn format_event(event: &HostEvent) -> String {
    match event {
        HostEvent::Run(run) => format_run_event(run),
        HostEvent::Console(console) => format_console(console),
    }
}

fn format_run_event(event: &RunEvent) -> String {
    match event {
        RunEvent::ProcessCreated { pid: Some(pid) } => format!("* process created (pid {})", pid),
        RunEvent::ProcessCreated { pid: None } => "* process created".to_string(),
        RunEvent::ProcessTerminated => "* process terminated".to_string(),
        RunEvent::ThreadCreated => "* thread created".to_string(),
        RunEvent::ThreadSuspended { reason } => format!("* suspended ({})", reason),
        RunEvent::ThreadResumed { reason } => format!("* resumed ({})", reason),
        RunEvent::ThreadTerminated => "* thread terminated".to_string(),
    }
}

fn format_console(event: &ConsoleEvent) -> String {
    if event.end_of_stream {
        format!("[{}] <closed>", event.stream)
    } else {
        format!("[{}] {}", event.stream, event.text.trim_end_matches(['\r', '\n']))
    }
}

pub fn format_frame(frame: &StackFrame) -> String {
    format!("#{:<3} {}", frame.index, frame.location())
}

pub fn format_script(script: &Script) -> String {
    match script.line_count {
        Some(lines) => format!("{:>5}  {} ({} lines)", script.id, script.name, lines),
        None => format!("{:>5}  {}", script.id, script.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptlink_debug::{ConsoleStream, ContinueReason};

    #[test]
    fn test_format_run_events() {
        let suspended = HostEvent::Run(RunEvent::ThreadSuspended {
            reason: ContinueReason::Breakpoint,
        });
        assert!(format_event(&suspended).starts_with("* suspended ("));
        assert_eq!(
            format_event(&HostEvent::Run(RunEvent::ProcessCreated { pid: Some(42) })),
            "* process created (pid 42)"
        );
    }

    #[test]
    fn test_format_console_strips_trailing_newline() {
        let event = HostEvent::Console(ConsoleEvent::text(ConsoleStream::Stderr, "oops\n"));
        assert_eq!(format_event(&event), "[stderr] oops");

        let closed = HostEvent::Console(ConsoleEvent::end(ConsoleStream::Stdout));
        assert_eq!(format_event(&closed), "[stdout] <closed>");
    }

    #[test]
    fn test_format_script() {
        let script = Script {
            id: 7,
            name: "main.js".to_string(),
            line_count: Some(12),
        };
        assert_eq!(format_script(&script), "    7  main.js (12 lines)");
    }
}
