use std::io::Read;

use permtunnel_channel::decode;

use crate::cmd::InspectArgs;
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let text = match args.message {
        Some(text) => text,
        None => read_stdin()?,
    };

    let message = decode(text.trim()).map_err(|err| channel_error("invalid message", err))?;
    print_message(&message, format);
    Ok(SUCCESS)
}

fn read_stdin() -> CliResult<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|err| CliError::new(FAILURE, format!("failed reading stdin: {err}")))?;
    Ok(text)
}
