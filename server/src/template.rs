//! Minimal text templating for the operator-supplied message texts
//!
//! Supports `{}` (next positional argument), `{name}` (named argument),
//! `{0}` (positional by index) and `{{` / `}}` escapes. Placeholders with no
//! matching argument are emitted verbatim so a typo in a config file shows up
//! in the output instead of silently vanishing.

pub fn render(template: &str, positional: &[&str], named: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_positional = 0;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }

                if !closed {
                    output.push('{');
                    output.push_str(&key);
                    continue;
                }

                let value = if key.is_empty() {
                    let value = positional.get(next_positional).copied();
                    next_positional += 1;
                    value
                } else if let Ok(index) = key.parse::<usize>() {
                    positional.get(index).copied()
                } else {
                    named
                        .iter()
                        .find(|(name, _)| *name == key)
                        .map(|(_, value)| *value)
                };

                match value {
                    Some(value) => output.push_str(value),
                    None => {
                        output.push('{');
                        output.push_str(&key);
                        output.push('}');
                    }
                }
            }
            _ => output.push(c),
        }
    }

    output
}
