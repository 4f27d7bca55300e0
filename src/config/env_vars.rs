/// Expand Windows-style environment variables (`%VAR%`).
/// Unknown variables are left untouched.
pub fn expand_windows_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('%') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('%') {
            Some(end) => {
                let var_name = &after[..end];
                match std::env::var(var_name) {
                    Ok(value) if !var_name.is_empty() => {
                        result.push_str(&value);
                        rest = &after[end + 1..];
                    }
                    _ => {
                        // Keep the opening % and retry from the closing one
                        result.push('%');
                        rest = after;
                    }
                }
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

/// Expand Unix-style environment variables (`$VAR` and `${VAR}`).
/// Unknown variables expand to the empty string, as in a shell.
pub fn expand_unix_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        // ${VAR}
        if let Some(&(_, '{')) = chars.peek() {
            match input[i + 2..].find('}') {
                Some(end) => {
                    let var_name = &input[i + 2..i + 2 + end];
                    result.push_str(&std::env::var(var_name).unwrap_or_default());
                    // Skip past the closing brace
                    while let Some((j, _)) = chars.next() {
                        if j == i + 2 + end {
                            break;
                        }
                    }
                }
                None => result.push(c),
            }
            continue;
        }

        // $VAR: name runs until the first non-alphanumeric, non-underscore character
        let mut var_end = i + 1;
        while let Some(&(j, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                var_end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        if var_end == i + 1 {
            result.push('$');
        } else {
            result.push_str(&std::env::var(&input[i + 1..var_end]).unwrap_or_default());
        }
    }

    result
}

/// Expand environment variables in a configured path using the conventions
/// of the current OS
pub fn expand_env_vars(input: &str) -> String {
    if cfg!(windows) {
        expand_windows_env_vars(input)
    } else {
        expand_unix_env_vars(input)
    }
}
