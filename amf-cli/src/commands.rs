use amf::{
    Amf0Decoder, Amf3Decoder, AmfVersion, ContextOptions, SerializationContext, Value,
};
use anyhow::{Context, Result};
use bytes::Bytes;
use flex_messages::register_messages;
use std::path::Path;
use tracing::{debug, info};

use crate::cli::{OutputFormat, Version};
use crate::config::AppConfig;
use crate::output::{format_values, from_json};

pub struct CommandExecutor {
    config: AppConfig,
    context: SerializationContext,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, options: ContextOptions) -> Result<Self> {
        debug!(?options, "building serialization context");
        let context = register_messages(SerializationContext::builder())
            .options(options)
            .build()
            .context("Failed to build the type registry")?;

        Ok(Self { config, context })
    }

    fn version(&self, version: Option<Version>) -> AmfVersion {
        version.map(AmfVersion::from).unwrap_or(self.config.default_version)
    }

    /// Decode every value in `payload`.
    pub fn decode(&self, payload: Bytes, version: AmfVersion) -> Result<Vec<Value>> {
        let size = payload.len();
        let (values, error) = match version {
            AmfVersion::Amf0 => Amf0Decoder::new(payload, &self.context).decode_all(),
            AmfVersion::Amf3 => Amf3Decoder::new(payload, &self.context).decode_all(),
        };

        if let Some(e) = error {
            return Err(anyhow::Error::new(e)
                .context(format!("Decoding failed after {} value(s)", values.len())));
        }

        info!(count = values.len(), size, ?version, "decoded payload");
        Ok(values)
    }

    pub fn decode_file(
        &self,
        file: &Path,
        hex: bool,
        version: Option<Version>,
        output: OutputFormat,
    ) -> Result<String> {
        let payload = read_payload(file, hex)?;
        let values = self.decode(payload, self.version(version))?;
        format_values(&values, output, self.config.pretty)
    }

    /// Encode a JSON document, given inline or as `@path`.
    pub fn encode(&self, json: &str, version: Option<Version>) -> Result<Bytes> {
        let text = match json.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {path}"))?,
            None => json.to_owned(),
        };
        let document: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse JSON input")?;
        let value = from_json(&document)?;

        let version = self.version(version);
        let bytes = amf::encode(&value, &self.context, version).context("Encoding failed")?;
        info!(size = bytes.len(), ?version, "encoded value");
        Ok(bytes)
    }
}

/// Read a payload file, decoding hex text when asked to.
fn read_payload(file: &Path, hex: bool) -> Result<Bytes> {
    let raw = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    if !hex {
        return Ok(Bytes::from(raw));
    }

    let text = String::from_utf8(raw).context("Hex input is not UTF-8")?;
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(digits).context("Invalid hex input")?;
    Ok(Bytes::from(bytes))
}
