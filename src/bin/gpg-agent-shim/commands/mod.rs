//! CLI command handlers for the client role.

use std::fs;
use std::process::ExitCode;

use color_eyre::eyre::{bail, Result as EyreResult, WrapErr};
use gpg_agent_shim::agent::{AgentClient, SignRequest};
use gpg_agent_shim::{gpg, SignatureValue};
use sha2::{Digest, Sha256};

use crate::cli::SignArgs;

/// Output format for CLI commands
pub enum OutputFormat {
    Human,
    Json,
}

pub fn run_sign(args: &SignArgs) -> ExitCode {
    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match sign(args) {
        Ok(signature) => {
            match format {
                OutputFormat::Json => match serde_json::to_string_pretty(&signature) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
                OutputFormat::Human => print_signature_human(&signature),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

pub fn run_keygrip(user_id: &str) -> ExitCode {
    match gpg::keygrip(user_id) {
        Ok(keygrip) => {
            println!("{}", keygrip);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: Failed to look up keygrip for {:?}: {}", user_id, e);
            ExitCode::FAILURE
        }
    }
}

fn sign(args: &SignArgs) -> EyreResult<SignatureValue> {
    let digest = read_digest(args)?;

    let keygrip = match (&args.keygrip, &args.user_id) {
        (Some(keygrip), _) => keygrip.clone(),
        (None, Some(user_id)) => gpg::keygrip(user_id)
            .wrap_err_with(|| format!("Failed to look up keygrip for {:?}", user_id))?,
        (None, None) => bail!("Either --keygrip or --user-id is required"),
    };

    let ttyname = match &args.tty {
        Some(tty) => tty.clone(),
        None => gpg::ttyname().wrap_err("Failed to determine the controlling terminal")?,
    };

    if !args.no_launch {
        gpg::launch_agent().wrap_err("Failed to launch gpg-agent")?;
    }

    let socket = args.socket_path();
    let mut client = AgentClient::connect(&socket)
        .wrap_err_with(|| format!("Failed to connect to agent at {}", socket.display()))?;

    let request = SignRequest::new(keygrip, digest, ttyname);
    Ok(client.sign(&request)?)
}

fn read_digest(args: &SignArgs) -> EyreResult<Vec<u8>> {
    match (&args.digest, &args.input) {
        (Some(digest), _) => {
            hex::decode(digest.trim()).wrap_err("Digest is not valid hex")
        }
        (None, Some(path)) => {
            let data = fs::read(path)
                .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
            Ok(Sha256::digest(&data).to_vec())
        }
        (None, None) => bail!("Either --digest or --input is required"),
    }
}

fn print_signature_human(signature: &SignatureValue) {
    println!("Algorithm:  {}", signature.algorithm().tag());
    match signature {
        SignatureValue::Ecdsa { r, s } => {
            println!("r:          {}", r);
            println!("s:          {}", s);
        }
        SignatureValue::Rsa { s } => {
            println!("s:          {} ({} bits)", s, s.bits());
        }
    }
}
