use std::io::{IsTerminal, Write};

use chronolink_node::BackendResponse;
use chronolink_protocol::Envelope;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EnvelopeOutput<'a> {
    name: &'a str,
    message_id: u8,
    #[serde(flatten)]
    envelope: &'a Envelope,
    size: usize,
}

pub fn print_envelope(envelope: &Envelope, frame: &[u8], format: OutputFormat) {
    let message = &envelope.message;
    match format {
        OutputFormat::Json => {
            let out = EnvelopeOutput {
                name: message.name(),
                message_id: message.message_id(),
                envelope,
                size: frame.len(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DIRECTION", "MESSAGE", "ADDRESS", "SIZE", "BODY"])
                .add_row(vec![
                    envelope.direction().to_string(),
                    format!("{} (0x{:02X})", message.name(), message.message_id()),
                    envelope.address.to_string(),
                    frame.len().to_string(),
                    body_json(envelope),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "direction={} message={} address={} size={} body={}",
                envelope.direction(),
                message.name(),
                envelope.address,
                frame.len(),
                body_json(envelope)
            );
        }
        OutputFormat::Raw => print_raw(frame),
    }
}

pub fn print_response(response: &BackendResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => println!("{}", response.to_json()),
        OutputFormat::Table => {
            let result = &response.result;
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["INST", "STATUS", "DEVICES", "MODE", "CTRL", "ERROR"])
                .add_row(vec![
                    result.inst.clone(),
                    status_name(response).to_string(),
                    result.id.join(", "),
                    optional(result.mode),
                    optional(result.ctrl),
                    result.error.clone().unwrap_or_default(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let result = &response.result;
            let mut line = format!("inst={} status={}", result.inst, status_name(response));
            if !result.id.is_empty() {
                line.push_str(&format!(" devices={}", result.id.join(",")));
            }
            if let Some(mode) = result.mode {
                line.push_str(&format!(" mode={mode}"));
            }
            if let Some(ctrl) = result.ctrl {
                line.push_str(&format!(" ctrl={ctrl}"));
            }
            if let Some(error) = &result.error {
                line.push_str(&format!(" error={error:?}"));
            }
            println!("{line}");
        }
    }
}

/// Frame bytes as hex text, or untouched in raw mode.
pub fn print_frame_bytes(frame: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Raw => print_raw(frame),
        OutputFormat::Json => println!(
            "{{\"frame\":\"{}\",\"size\":{}}}",
            to_hex(frame),
            frame.len()
        ),
        OutputFormat::Table | OutputFormat::Pretty => println!("{}", to_hex(frame)),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}

fn status_name(response: &BackendResponse) -> &'static str {
    if response.is_ok() {
        "OK"
    } else {
        "ERROR"
    }
}

fn optional(value: Option<u8>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn body_json(envelope: &Envelope) -> String {
    serde_json::to_string(&envelope.message).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_uppercase_without_separators() {
        assert_eq!(to_hex(&[0xAB, 0xCD, 0x00, 0x0A]), "ABCD000A");
        assert_eq!(to_hex(&[]), "");
    }
}
