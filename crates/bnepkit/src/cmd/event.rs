use bnepkit_event::{catalog, Arg, EventTemplate};
use bnepkit_transport::BdAddr;
use serde::Serialize;

use crate::cmd::{parse_u16, EventArgs};
use crate::exit::{event_error, CliError, CliResult, SUCCESS};
use crate::output::{parse_hex, print_json, print_raw, print_table, OutputFormat};

#[derive(Serialize)]
struct CatalogEntry {
    name: &'static str,
    code: u8,
    subevent: u8,
    template: &'static str,
}

#[derive(Serialize)]
struct EventOutput<'a> {
    name: Option<&'a str>,
    code: u8,
    subevent: u8,
    template: &'a str,
    size: usize,
    #[serde(serialize_with = "bnepkit_frame::hex::serialize")]
    record: Vec<u8>,
}

/// Owned form of one command-line field value.
#[derive(Debug, PartialEq)]
enum Value {
    Int(u32),
    Addr(BdAddr),
    Bytes(Vec<u8>),
}

impl Value {
    fn as_arg(&self) -> Arg<'_> {
        match self {
            Value::Int(value) => Arg::Int(*value),
            Value::Addr(addr) => Arg::Addr(*addr),
            Value::Bytes(bytes) => Arg::Bytes(bytes),
        }
    }
}

pub fn run(args: EventArgs, format: OutputFormat) -> CliResult<i32> {
    if args.list {
        print_catalog(format);
        return Ok(SUCCESS);
    }

    let (name, template) = match (&args.name, &args.template) {
        (Some(name), _) => {
            let template = catalog::lookup(name)
                .ok_or_else(|| CliError::usage(format!("unknown event template: {name}")))?;
            (Some(name.as_str()), template)
        }
        (None, Some(fields)) => {
            let code = args
                .code
                .ok_or_else(|| CliError::usage("--template requires --code"))?;
            let template = EventTemplate::try_new(code, args.subevent, fields)
                .map_err(|err| event_error("invalid template", err))?;
            (None, template)
        }
        (None, None) => {
            return Err(CliError::usage(
                "provide a catalog name, --template or --list",
            ))
        }
    };

    let values = parse_values(template.format(), &args.args)?;
    let arg_list: Vec<Arg<'_>> = values.iter().map(Value::as_arg).collect();
    let record = template
        .render_to_vec(&arg_list)
        .map_err(|err| event_error("render failed", err))?;

    let out = EventOutput {
        name,
        code: template.code(),
        subevent: template.subevent(),
        template: template.format(),
        size: record.len(),
        record,
    };
    print_event(&out, format);
    Ok(SUCCESS)
}

/// Interpret each raw value by the tag it lines up with. Surplus values are
/// passed through as integers so the renderer reports the count mismatch.
fn parse_values(format: &str, raw: &[String]) -> CliResult<Vec<Value>> {
    let mut tags = format.chars();
    raw.iter()
        .enumerate()
        .map(|(index, input)| {
            let tag = tags.next().unwrap_or('1');
            parse_value(tag, input).map_err(|reason| {
                CliError::usage(format!("argument {index} ('{tag}'): {reason}"))
            })
        })
        .collect()
}

fn parse_value(tag: char, input: &str) -> Result<Value, String> {
    match tag {
        'B' => input
            .parse::<BdAddr>()
            .map(Value::Addr)
            .map_err(|err| err.to_string()),
        'Q' | 'V' => parse_hex(input)
            .map(Value::Bytes)
            .map_err(|err| format!("invalid hex: {err}")),
        '3' | '4' => parse_u32(input).map(Value::Int),
        _ => parse_u16(input).map(|value| Value::Int(u32::from(value))),
    }
}

fn parse_u32(input: &str) -> Result<u32, String> {
    let input = input.trim();
    let parsed = match input.strip_prefix("0x") {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid integer: {input}"))
}

fn print_event(out: &EventOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_table(
            &["NAME", "CODE", "TEMPLATE", "SIZE", "RECORD"],
            [vec![
                out.name.unwrap_or("-").to_string(),
                format!("0x{:02x}", out.code),
                out.template.to_string(),
                out.size.to_string(),
                hex::encode(&out.record),
            ]],
        ),
        OutputFormat::Pretty => println!("{}", hex::encode(&out.record)),
        OutputFormat::Raw => print_raw(&out.record),
    }
}

fn print_catalog(format: OutputFormat) {
    let entries: Vec<CatalogEntry> = catalog::ALL
        .iter()
        .map(|(name, template)| CatalogEntry {
            name: *name,
            code: template.code(),
            subevent: template.subevent(),
            template: template.format(),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Table => print_table(
            &["NAME", "CODE", "SUBEVENT", "TEMPLATE"],
            entries.iter().map(|entry| {
                vec![
                    entry.name.to_string(),
                    format!("0x{:02x}", entry.code),
                    format!("0x{:02x}", entry.subevent),
                    entry.template.to_string(),
                ]
            }),
        ),
        OutputFormat::Pretty | OutputFormat::Raw => {
            for entry in &entries {
                println!("{:<34} 0x{:02x} {}", entry.name, entry.code, entry.template);
            }
        }
    }
}
