//! `hdh-relay init`: generate a starter configuration file.
//!
//! Creates a YAML, JSON, or TOML config file with either minimal
//! or fully documented templates.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::error::RelayError;

pub fn execute(args: &InitArgs) -> Result<(), RelayError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("hdh-relay.{}", args.format.extension())));

    if output.exists() {
        return Err(RelayError::FileExists { path: output });
    }

    std::fs::write(&output, template(&args.format, args.full))?;
    println!("Created {}", output.display());
    Ok(())
}

const fn template(format: &ConfigFormat, full: bool) -> &'static str {
    match (format, full) {
        (ConfigFormat::Yaml, false) => YAML_MINIMAL,
        (ConfigFormat::Yaml, true) => YAML_FULL,
        (ConfigFormat::Json, false) => JSON_MINIMAL,
        (ConfigFormat::Json, true) => JSON_FULL,
        (ConfigFormat::Toml, false) => TOML_MINIMAL,
        (ConfigFormat::Toml, true) => TOML_FULL,
    }
}

const YAML_MINIMAL: &str = r#"# hdh-relay config

gateway:
  # Endpoint that relays requests for private hub domains.
  url: "https://gateway.example.com/default/hdh-relay"
"#;

const YAML_FULL: &str = r#"# hdh-relay config
#
# All values shown are defaults except gateway.url.

gateway:
  url: "https://gateway.example.com/default/hdh-relay"   # Also GATEWAY_URL
  timeout: 30000          # ms per gateway call
  max_retries: 1          # Extra attempts when the gateway answers 500
  retry_delay: 1000       # ms between attempts

direct:
  timeout: 20000          # ms per hub call (also REQUEST_TIMEOUT_MS)
  max_connections: 50     # Concurrent connections per hub host
  fallback_to_gateway: false   # Retry public domains via the gateway on network errors

# localhost, loopback and RFC 1918 addresses are always private.
classifier:
  # Hostnames ending with one of these are only reachable via the gateway
  private_suffixes:
    - ".rnd.hdh.nextgenaws.net"
  # Hostnames containing one of these are only reachable via the gateway
  private_infixes:
    - ".internal."
    - ".private."

messages:
  api_path: "health-data-hub/api/v1"
  default_data_source: "LAB2"   # dataSourceIdentifier for HL7/CDA when none is given
  hl7_line_endings: preserve    # preserve | crlf | cr
"#;

const JSON_MINIMAL: &str = r#"{
  "gateway": {
    "url": "https://gateway.example.com/default/hdh-relay"
  }
}
"#;

const JSON_FULL: &str = r#"{
  "gateway": {
    "url": "https://gateway.example.com/default/hdh-relay",
    "timeout": 30000,
    "max_retries": 1,
    "retry_delay": 1000
  },
  "direct": {
    "timeout": 20000,
    "max_connections": 50,
    "fallback_to_gateway": false
  },
  "classifier": {
    "private_suffixes": [".rnd.hdh.nextgenaws.net"],
    "private_infixes": [".internal.", ".private."]
  },
  "messages": {
    "api_path": "health-data-hub/api/v1",
    "default_data_source": "LAB2",
    "hl7_line_endings": "preserve"
  }
}
"#;

const TOML_MINIMAL: &str = r#"# hdh-relay config

[gateway]
url = "https://gateway.example.com/default/hdh-relay"
"#;

const TOML_FULL: &str = r#"# hdh-relay config
#
# All values shown are defaults. Uncomment and modify as needed.

[gateway]
# url = "https://gateway.example.com/default/hdh-relay"
# timeout = 30000
# max_retries = 1
# retry_delay = 1000

[direct]
# timeout = 20000
# max_connections = 50
# fallback_to_gateway = false

[classifier]
# private_suffixes = [".rnd.hdh.nextgenaws.net"]
# private_infixes = [".internal.", ".private."]

[messages]
# api_path = "health-data-hub/api/v1"
# default_data_source = "LAB2"
# hl7_line_endings = "preserve"
"#;
