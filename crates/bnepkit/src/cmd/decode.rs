use bnepkit_frame::{decode_packet, BnepPacket, ControlMessage, EthernetFrame, PacketBody};
use serde::Serialize;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS};
use crate::output::{parse_hex, print_json, print_raw, print_table, OutputFormat};

#[derive(Serialize)]
struct DecodeOutput {
    size: usize,
    packet: BnepPacket,
    /// Control messages carried in control extension headers.
    extension_controls: Vec<ControlMessage>,
    frame: Option<EthernetFrame>,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.packet)
        .map_err(|err| CliError::usage(format!("invalid hex packet: {err}")))?;
    let packet = decode_packet(&bytes).map_err(|err| frame_error("decode failed", err))?;

    let mut extension_controls = Vec::new();
    for ext in packet.extensions.iter().filter(|ext| ext.is_control()) {
        let (message, _) = ControlMessage::decode(&ext.data)
            .map_err(|err| frame_error("decode failed", err.into()))?;
        extension_controls.push(message);
    }

    let frame = match (args.local, args.remote) {
        (Some(local), Some(remote)) => packet.ethernet_frame(local, remote),
        _ => None,
    };

    let out = DecodeOutput {
        size: bytes.len(),
        packet,
        extension_controls,
        frame,
    };
    print_decoded(&out, format);
    Ok(SUCCESS)
}

fn print_decoded(out: &DecodeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let packet_type = out.packet.packet_type;
            let mut rows = vec![
                vec!["size".to_string(), out.size.to_string()],
                vec![
                    "type".to_string(),
                    format!("{packet_type:?} (0x{:02x})", packet_type.as_u8()),
                ],
            ];
            match &out.packet.body {
                PacketBody::Ethernet {
                    dst,
                    src,
                    ethertype,
                } => {
                    rows.push(vec!["dst".to_string(), addr_or_implied(dst)]);
                    rows.push(vec!["src".to_string(), addr_or_implied(src)]);
                    rows.push(vec!["ethertype".to_string(), format!("0x{ethertype:04x}")]);
                }
                PacketBody::Control(message) => {
                    rows.push(vec!["control".to_string(), format!("{message:?}")]);
                }
            }
            for ext in &out.packet.extensions {
                rows.push(vec![
                    format!("extension 0x{:02x}", ext.ext_type),
                    format!("{} bytes", ext.data.len()),
                ]);
            }
            for message in &out.extension_controls {
                rows.push(vec![
                    "extension control".to_string(),
                    format!("{message:?}"),
                ]);
            }
            rows.push(vec![
                "payload".to_string(),
                format!("{} bytes", out.packet.payload.len()),
            ]);
            if let Some(frame) = &out.frame {
                rows.push(vec![
                    "frame".to_string(),
                    format!("{} -> {} 0x{:04x}", frame.src, frame.dst, frame.ethertype),
                ]);
            }

            if matches!(format, OutputFormat::Pretty) {
                for row in rows {
                    println!("{:<18} {}", row[0], row[1]);
                }
            } else {
                print_table(&["FIELD", "VALUE"], rows);
            }
        }
        OutputFormat::Raw => print_raw(&out.packet.payload),
    }
}

fn addr_or_implied(addr: &Option<bnepkit_transport::BdAddr>) -> String {
    match addr {
        Some(addr) => addr.to_string(),
        None => "(implied by channel)".to_string(),
    }
}
