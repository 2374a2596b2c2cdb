use bnepkit::sim::{Link, Observation, Side};
use bnepkit_frame::{EthernetFrame, NetTypeRange, PacketBody};
use bnepkit_peer::SendStatus;
use bnepkit_transport::{BdAddr, PSM_BNEP};
use serde::Serialize;
use tracing::info;

use crate::cmd::{parse_u16, SimulateArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_json, print_raw, print_table, OutputFormat};

const A_ADDR: BdAddr = BdAddr::new([0x00, 0x1B, 0xDC, 0x00, 0x00, 0x0A]);
const B_ADDR: BdAddr = BdAddr::new([0x00, 0x1B, 0xDC, 0x00, 0x00, 0x0B]);

/// Service frame size advertised by side B.
const SERVICE_FRAME_SIZE: u16 = 1500;

#[derive(Serialize)]
struct SendOutcome {
    kind: &'static str,
    from: Side,
    cid: u16,
    status: SendStatus,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let ranges = args
        .net_filter
        .iter()
        .map(|raw| parse_range(raw))
        .collect::<CliResult<Vec<_>>>()?;

    let mut link = Link::new(A_ADDR, B_ADDR);
    let b_handler = link.recorder(Side::B);
    link.engine_mut(Side::B)
        .register_service(args.b_role.uuid16(), SERVICE_FRAME_SIZE, b_handler)
        .map_err(|err| peer_error("register failed", err))?;

    let a_handler = link.recorder(Side::A);
    link.engine_mut(Side::A)
        .connect(
            B_ADDR,
            PSM_BNEP,
            args.a_role.uuid16(),
            args.b_role.uuid16(),
            a_handler,
        )
        .map_err(|err| peer_error("connect failed", err))?;
    pump(&mut link)?;

    let (Some(a_cid), Some(b_cid)) = (link.cid(Side::A), link.cid(Side::B)) else {
        print_observations(&link.take_observations(), &[], format);
        return Err(CliError::new(FAILURE, "channel setup was rejected"));
    };
    info!(a_cid, b_cid, "channel connected");

    if !ranges.is_empty() {
        link.engine_mut(Side::A)
            .set_net_filter(a_cid, &ranges)
            .map_err(|err| peer_error("filter failed", err))?;
        pump(&mut link)?;
    }

    let payload = args.payload.into_bytes();
    let mut sends = Vec::new();
    for (from, cid) in [(Side::A, a_cid), (Side::B, b_cid)] {
        let frame = EthernetFrame::new(
            link.addr(from.peer()),
            link.addr(from),
            args.ethertype,
            payload.clone(),
        );
        let status = link
            .engine_mut(from)
            .send_frame(cid, &frame)
            .map_err(|err| peer_error("send failed", err))?;
        pump(&mut link)?;
        sends.push(SendOutcome {
            kind: "send",
            from,
            cid,
            status,
        });
    }

    if !args.keep_open {
        link.engine_mut(Side::A)
            .disconnect(B_ADDR)
            .map_err(|err| peer_error("disconnect failed", err))?;
        pump(&mut link)?;
    }

    print_observations(&link.take_observations(), &sends, format);
    Ok(SUCCESS)
}

fn pump(link: &mut Link) -> CliResult<()> {
    link.pump()
        .map(|_| ())
        .map_err(|err| peer_error("link failed", err))
}

/// `0x0800` or `0x0800-0x0806`.
fn parse_range(raw: &str) -> CliResult<NetTypeRange> {
    let parse = |value: &str| parse_u16(value).map_err(CliError::usage);
    match raw.split_once('-') {
        Some((start, end)) => {
            let (start, end) = (parse(start)?, parse(end)?);
            if start > end {
                return Err(CliError::usage(format!("range start exceeds end: {raw}")));
            }
            Ok(NetTypeRange::new(start, end))
        }
        None => Ok(NetTypeRange::single(parse(raw)?)),
    }
}

fn print_observations(observations: &[Observation], sends: &[SendOutcome], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for observation in observations {
                print_json(observation);
            }
            for send in sends {
                print_json(send);
            }
        }
        OutputFormat::Table => {
            let rows = observations
                .iter()
                .map(describe)
                .chain(sends.iter().map(|send| {
                    (
                        send.from.to_string(),
                        "send".to_string(),
                        format!("cid=0x{:04x} {:?}", send.cid, send.status),
                    )
                }))
                .map(|(side, kind, detail)| vec![side, kind, detail]);
            print_table(&["SIDE", "KIND", "DETAIL"], rows);
        }
        OutputFormat::Pretty => {
            for (side, kind, detail) in observations.iter().map(describe) {
                println!("[{side}] {kind:<12} {detail}");
            }
            for send in sends {
                println!(
                    "[{}] {:<12} cid=0x{:04x} {:?}",
                    send.from, "send", send.cid, send.status
                );
            }
        }
        OutputFormat::Raw => {
            for observation in observations {
                if let Observation::Packet { bytes, .. } = observation {
                    print_raw(hex::encode(bytes).as_bytes());
                    print_raw(b"\n");
                }
            }
        }
    }
}

fn describe(observation: &Observation) -> (String, String, String) {
    match observation {
        Observation::Packet {
            from,
            cid,
            bytes,
            decoded,
        } => {
            let summary = match decoded.as_ref().map(|packet| &packet.body) {
                Some(PacketBody::Control(message)) => format!("{:?}", message.control_type()),
                Some(PacketBody::Ethernet { ethertype, .. }) => {
                    format!("ethertype=0x{ethertype:04x}")
                }
                None => "undecodable".to_string(),
            };
            (
                from.to_string(),
                "packet".to_string(),
                format!("cid=0x{cid:04x} {summary} {}", hex::encode(bytes)),
            )
        }
        Observation::Notification { side, event } => {
            (side.to_string(), "notification".to_string(), event.to_string())
        }
        Observation::Frame { side, cid, frame } => (
            side.to_string(),
            "frame".to_string(),
            format!(
                "cid=0x{cid:04x} {} -> {} 0x{:04x} {} bytes",
                frame.src,
                frame.dst,
                frame.ethertype,
                frame.payload.len()
            ),
        ),
    }
}
