// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements command-line argument parsing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The Hopper DNS nameserver
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server
    Run(RunArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Set the configuration file to use
    #[clap(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Override the configured bind IP address and port
    #[clap(long, value_name = "IP:PORT")]
    pub bind: Option<SocketAddr>,

    /// Override the configured bind IP address
    #[clap(long, conflicts_with = "bind", value_name = "IP")]
    pub ip: Option<IpAddr>,

    /// Override the configured bind port
    #[clap(long, conflicts_with = "bind", value_name = "PORT")]
    pub port: Option<u16>,
}

impl RunArgs {
    /// Applies the bind address overrides given on the command line to
    /// the configured address.
    pub fn bind_address(&self, configured: SocketAddr) -> SocketAddr {
        self.bind.unwrap_or_else(|| {
            let ip = self.ip.unwrap_or_else(|| configured.ip());
            let port = self.port.unwrap_or_else(|| configured.port());
            SocketAddr::new(ip, port)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(args: &[&str]) -> Result<RunArgs, clap::Error> {
        let base = ["hopperd", "run", "--config", "hopper.toml"];
        let args = Args::try_parse_from(base.iter().chain(args))?;
        match args.command {
            Command::Run(run_args) => Ok(run_args),
        }
    }

    #[test]
    fn config_is_required() {
        assert!(Args::try_parse_from(["hopperd", "run"]).is_err());
        let args = run_args(&[]).unwrap();
        assert_eq!(args.config, PathBuf::from("hopper.toml"));
    }

    #[test]
    fn bind_overrides_apply() {
        let configured: SocketAddr = "0.0.0.0:53".parse().unwrap();
        assert_eq!(run_args(&[]).unwrap().bind_address(configured), configured);
        assert_eq!(
            run_args(&["--bind", "127.0.0.1:5300"])
                .unwrap()
                .bind_address(configured),
            "127.0.0.1:5300".parse().unwrap(),
        );
        assert_eq!(
            run_args(&["--port", "5301"]).unwrap().bind_address(configured),
            "0.0.0.0:5301".parse().unwrap(),
        );
        assert_eq!(
            run_args(&["--ip", "127.0.0.2", "--port", "5302"])
                .unwrap()
                .bind_address(configured),
            "127.0.0.2:5302".parse().unwrap(),
        );
    }

    #[test]
    fn bind_conflicts_with_ip_and_port() {
        assert!(run_args(&["--bind", "127.0.0.1:53", "--ip", "127.0.0.2"]).is_err());
        assert!(run_args(&["--bind", "127.0.0.1:53", "--port", "54"]).is_err());
    }
}
