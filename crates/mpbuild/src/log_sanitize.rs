//! Terminal-safe rendering of toolchain output for log lines.
//!
//! Compiler and make output often carries colour codes and progress escapes.
//! Lines routed through `tracing` are stripped of escape sequences and other
//! control characters and capped in length. Captured output handed back to
//! callers is never passed through here.

const MAX_LOG_CHARS: usize = 4096;

#[derive(Clone, Copy)]
enum Escape {
    Start,
    Csi,
    Osc { after_esc: bool },
    StringTerminated { after_esc: bool },
}

impl Escape {
    // Feed one char of an escape sequence; `None` means the sequence ended.
    fn step(self, c: char) -> Option<Escape> {
        match self {
            Escape::Start => match c {
                '[' => Some(Escape::Csi),
                ']' => Some(Escape::Osc { after_esc: false }),
                'P' | 'X' | '^' | '_' => Some(Escape::StringTerminated { after_esc: false }),
                _ => None,
            },
            Escape::Csi => (!('@'..='~').contains(&c)).then_some(Escape::Csi),
            Escape::Osc { after_esc } => match c {
                '\x07' => None,
                '\\' if after_esc => None,
                '\x1b' => Some(Escape::Osc { after_esc: true }),
                _ => Some(Escape::Osc { after_esc: false }),
            },
            Escape::StringTerminated { after_esc } => match c {
                '\\' if after_esc => None,
                '\x1b' => Some(Escape::StringTerminated { after_esc: true }),
                _ => Some(Escape::StringTerminated { after_esc: false }),
            },
        }
    }
}

pub fn sanitize_log_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LOG_CHARS));
    let mut escape: Option<Escape> = None;
    let mut kept = 0usize;

    for c in input.chars() {
        if let Some(state) = escape {
            escape = state.step(c);
            continue;
        }
        match c {
            '\x1b' => {
                escape = Some(Escape::Start);
                continue;
            }
            '\r' | '\n' => continue,
            '\t' => out.push(' '),
            c if c.is_control() || is_bidi_control(c) => continue,
            c => out.push(c),
        }
        kept += 1;
        if kept >= MAX_LOG_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }
    out
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}
