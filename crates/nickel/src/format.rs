//! The `fmt`/`pfmt` directive engine.
//!
//! A directive is `{body}` where the body is a printf-style specification:
//! an optional `-` flag, an optional width (digits, or `*` to pull the width
//! from the next Int argument), and a conversion character. `d` expands an
//! Int in decimal, `x` in lower hex, and `s` expands a String's payload. A
//! body with no trailing alphabetic conversion stringifies its argument
//! through the node printer instead. `\{` emits a literal brace.

use crate::{
    eval::{int_arg, Exception},
    node::{Node, NodeKind},
};

/// Expands `args[1]` (the format string) against `args[2..]`.
/// `args[0]` is the function-name node, kept for diagnostics.
pub fn expand(function: &str, args: &[Node]) -> Result<String, Exception> {
    if args.len() < 2 {
        return Err(Exception::ArityAtLeast {
            function: function.into(),
            expected: 1,
            got: args.len() - 1,
        });
    }
    let Node::String(format) = &args[1] else {
        return Err(Exception::Kind {
            function: function.into(),
            index: 1,
            expected: NodeKind::String,
            got: args[1].kind(),
        });
    };

    let mut out = String::new();
    let mut next_arg = 2;
    let mut rest = format.as_str();

    while let Some(brace) = rest.find('{') {
        out.push_str(&rest[..brace]);
        rest = &rest[brace + 1..];

        // An escaped brace. The backslash was copied to the output verbatim,
        // so it gets consumed from there.
        if out.ends_with('\\') {
            out.pop();
            out.push('{');
            continue;
        }

        let Some(close) = rest.find('}') else {
            // An unterminated directive discards the rest of the format.
            return Ok(out);
        };
        let directive = &rest[..close];
        rest = &rest[close + 1..];

        expand_directive(function, directive, args, &mut next_arg, &mut out)?;
    }

    out.push_str(rest);
    Ok(out)
}

fn expand_directive(
    function: &str,
    directive: &str,
    args: &[Node],
    next_arg: &mut usize,
    out: &mut String,
) -> Result<(), Exception> {
    // The conversion character is the final byte, if and only if that byte
    // is alphabetic. `{10d}` is a width-10 `d`; `{10}` has no conversion and
    // stringifies its argument.
    let (spec, conversion) = match directive.chars().next_back() {
        Some(c) if c.is_ascii_alphabetic() => {
            (&directive[..directive.len() - c.len_utf8()], Some(c))
        }
        _ => (directive, None),
    };

    let mut left_justify = spec.starts_with('-');
    let spec = spec.strip_prefix('-').unwrap_or(spec);

    let width: i64 = if spec.contains('*') {
        // `*` consumes an extra argument: the width, before the value.
        let index = next_index(directive, args, next_arg)?;
        int_arg(function, args, index)?
    } else if spec.is_empty() {
        0
    } else {
        spec.parse().map_err(|_| Exception::BadDirective {
            directive: directive.into(),
        })?
    };
    // A negative width means left justification, like printf. `unsigned_abs`
    // because `i64::MIN` is a permitted width argument.
    if width < 0 {
        left_justify = true;
    }
    let width = width.unsigned_abs() as usize;

    let index = next_index(directive, args, next_arg)?;
    let rendered = match conversion {
        None => args[index].to_string(),
        Some('d') => int_arg(function, args, index)?.to_string(),
        Some('x') => format!("{:x}", int_arg(function, args, index)?),
        Some('s') => match &args[index] {
            Node::String(string) => string.clone(),
            other => {
                return Err(Exception::Kind {
                    function: function.into(),
                    index,
                    expected: NodeKind::String,
                    got: other.kind(),
                })
            }
        },
        Some(_) => {
            return Err(Exception::BadDirective {
                directive: directive.into(),
            })
        }
    };

    if rendered.len() < width {
        let padding = " ".repeat(width - rendered.len());
        if left_justify {
            out.push_str(&rendered);
            out.push_str(&padding);
        } else {
            out.push_str(&padding);
            out.push_str(&rendered);
        }
    } else {
        out.push_str(&rendered);
    }

    Ok(())
}

fn next_index(directive: &str, args: &[Node], next_arg: &mut usize) -> Result<usize, Exception> {
    if *next_arg >= args.len() {
        return Err(Exception::MissingFormatArgument {
            directive: directive.into(),
        });
    }
    let index = *next_arg;
    *next_arg += 1;
    Ok(index)
}
