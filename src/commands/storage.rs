//! Storage commands.
//!
//! - `crux get <key>` - print a live value as JSON
//! - `crux set <key> <value> [--ttl ms]` - write a value
//! - `crux rm <key>` - remove a key
//! - `crux keys` - list keys in the namespace
//! - `crux clear` - remove every key in the namespace
//! - `crux purge` - remove expired entries

use anyhow::{Result, bail};
use serde_json::Value;
use std::time::Duration;

use super::Context;
use crate::Commands;

/// Execute a storage command.
pub fn execute(ctx: &Context, command: Commands) -> Result<()> {
    let cache = &ctx.cache;

    match command {
        Commands::Get { key, compact } => {
            let Some(value) = cache.read::<Value>(&key) else {
                bail!("Key not found: {key}");
            };
            let rendered = if compact {
                serde_json::to_string(&value)?
            } else {
                serde_json::to_string_pretty(&value)?
            };
            println!("{rendered}");
        },
        Commands::Set { key, value, ttl } => {
            let value = parse_value(&value);
            let ttl = ttl.filter(|ms| *ms > 0).map(Duration::from_millis);
            cache.write(&key, &value, ttl);
            if !cache.has(&key) {
                bail!("Failed to store '{key}' (see logs)");
            }
            match ttl {
                Some(ttl) => println!("Stored {key} (expires in {} ms)", ttl.as_millis()),
                None => println!("Stored {key}"),
            }
        },
        Commands::Rm { key } => {
            cache.remove(&key);
            println!("Removed {key}");
        },
        Commands::Keys => {
            let mut keys = cache.keys();
            keys.sort();
            for key in keys {
                println!("{key}");
            }
        },
        Commands::Clear => {
            let count = cache.keys().len();
            cache.clear();
            println!(
                "Cleared {count} key(s) under '{}'",
                ctx.config.storage.prefix
            );
        },
        Commands::Purge => {
            let removed = cache.purge_expired();
            if removed == 0 {
                println!("No expired entries.");
            } else {
                println!("Purged {removed} expired entries");
            }
        },
    }

    Ok(())
}

/// Parses a command line value as JSON, falling back to a plain string.
fn parse_value(input: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value_json() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("{\"a\":[1,2]}"), json!({ "a": [1, 2] }));
        assert_eq!(parse_value("null"), Value::Null);
    }

    #[test]
    fn test_parse_value_falls_back_to_string() {
        assert_eq!(parse_value("dark"), json!("dark"));
        assert_eq!(parse_value("{broken"), json!("{broken"));
    }
}
