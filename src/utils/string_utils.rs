/// Pure string processing utilities (Discord-agnostic)

/// Split command arguments on whitespace, keeping quoted sections together.
///
/// Double quotes allow `\"` escapes inside them; backticks are taken verbatim.
/// An unterminated quote runs to the end of the input.
pub fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '`' => {
                let quote = c;
                in_arg = true;
                while let Some(inner) = chars.next() {
                    if inner == quote {
                        break;
                    }
                    if quote == '"' && inner == '\\' {
                        if let Some(&next) = chars.peek() {
                            if next == '"' {
                                current.push(next);
                                chars.next();
                                continue;
                            }
                        }
                    }
                    current.push(inner);
                }
            }
            c if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                in_arg = true;
                current.push(c);
            }
        }
    }

    if in_arg {
        args.push(current);
    }

    args
}

/// Check whether a string is longer than `max` characters
pub fn exceeds_chars(text: &str, max: usize) -> bool {
    text.chars().nth(max).is_some()
}
