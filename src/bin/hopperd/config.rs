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

//! Implements the server configuration file.

use std::fmt::{self, Write};
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use hopper::name::Name;
use hopper::server::{
    Server, DEFAULT_MAX_REFERRALS, DEFAULT_SESSION_TIMEOUT, DEFAULT_UPSTREAM_PORT,
};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config =
        fs::read_to_string(path.as_ref()).context("failed to read the configuration file")?;
    let config = parse(&raw_config).context("failed to parse the configuration file")?;
    log_config_summary(&config);
    Ok(config)
}

/// Parses the text of a configuration file.
pub fn parse(raw_config: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(raw_config)
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let mode = if config.resolver.iterative {
        "iterative"
    } else {
        "authoritative only"
    };
    let mut message = format!(
        "Configuration loaded:\n\
         Bind address:  {}\n\
         I/O provider:  {}\n\
         Resolution:    {}\n\
         Zones:         ",
        config.bind,
        config.io.name(),
        mode,
    );
    if config.zones.is_empty() {
        message.push_str("none to load");
    } else {
        write!(message, "{} to load", config.zones.len()).unwrap();
        for zone_config in &config.zones {
            write!(
                message,
                "\n  {} ({} records, {} PTR records)",
                zone_config.apex.0,
                zone_config.records.len(),
                zone_config.ptr.len(),
            )
            .unwrap();
        }
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_io_provider_config")]
    pub io: IoProviderConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_BIND_PORT: u16 = 53;

fn default_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_BIND_PORT)
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: I/O PROVIDERS                               //
////////////////////////////////////////////////////////////////////////

/// An abstraction over all supported I/O providers, once bound.
pub trait IoProvider {
    fn start(self: Box<Self>, server: &Arc<Server>) -> io::Result<Box<dyn RunningProvider>>;
}

/// An I/O provider that has been started.
pub trait RunningProvider {
    /// Stops the provider, waiting for it to finish.
    fn shut_down(self: Box<Self>);
}

/// The selection of I/O provider.
///
/// To actually create the selected provider and bind it to an address,
/// use [`IoProviderConfig::bind_provider`].
#[derive(Debug, Deserialize)]
#[serde(tag = "provider")]
pub enum IoProviderConfig {
    #[serde(rename = "blocking")]
    Blocking,
    #[cfg(feature = "tokio")]
    #[serde(rename = "tokio")]
    Tokio,
}

impl IoProviderConfig {
    /// Returns the name of the selected I/O provider.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            #[cfg(feature = "tokio")]
            Self::Tokio => "tokio",
        }
    }

    /// Creates the selected I/O provider and binds it to the provided
    /// address.
    pub fn bind_provider(&self, addr: SocketAddr) -> io::Result<Box<dyn IoProvider>> {
        match self {
            Self::Blocking => {
                let io_provider = hopper::io::BlockingIoProvider::bind(addr)?;
                Ok(Box::new(io_provider))
            }
            #[cfg(feature = "tokio")]
            Self::Tokio => {
                let io_provider = tokio_io::Provider::bind(addr)?;
                Ok(Box::new(io_provider))
            }
        }
    }
}

fn default_io_provider_config() -> IoProviderConfig {
    IoProviderConfig::Blocking
}

/// Support for the
/// [`BlockingIoProvider`](hopper::io::BlockingIoProvider).
mod blocking_io {
    use super::*;
    use hopper::io::{BlockingIoProvider, BlockingShutdownController};

    impl IoProvider for BlockingIoProvider {
        fn start(self: Box<Self>, server: &Arc<Server>) -> io::Result<Box<dyn RunningProvider>> {
            let controller = BlockingIoProvider::start(*self, server)?;
            Ok(Box::new(controller))
        }
    }

    impl RunningProvider for BlockingShutdownController {
        fn shut_down(self: Box<Self>) {
            BlockingShutdownController::shut_down(*self)
        }
    }
}

/// Support for the [`TokioIoProvider`](hopper::io::TokioIoProvider).
/// Since the rest of the daemon is synchronous, the provider carries
/// its own Tokio runtime.
#[cfg(feature = "tokio")]
mod tokio_io {
    use super::*;
    use hopper::io::{TokioIoProvider, TokioShutdownController};
    use tokio::runtime::Runtime;

    pub struct Provider {
        runtime: Runtime,
        provider: TokioIoProvider,
    }

    impl Provider {
        pub fn bind(addr: SocketAddr) -> io::Result<Self> {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let provider = runtime.block_on(TokioIoProvider::bind(addr))?;
            Ok(Self { runtime, provider })
        }
    }

    impl IoProvider for Provider {
        fn start(self: Box<Self>, server: &Arc<Server>) -> io::Result<Box<dyn RunningProvider>> {
            let Provider { runtime, provider } = *self;
            let controller = {
                let _guard = runtime.enter();
                provider.start(server)
            };
            Ok(Box::new(Running {
                runtime,
                controller,
            }))
        }
    }

    struct Running {
        runtime: Runtime,
        controller: TokioShutdownController,
    }

    impl RunningProvider for Running {
        fn shut_down(self: Box<Self>) {
            let Running {
                runtime,
                controller,
            } = *self;
            runtime.block_on(controller.shut_down());
        }
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: RESOLVER                                    //
////////////////////////////////////////////////////////////////////////

/// The configuration of iterative resolution.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    #[serde(default = "default_iterative")]
    pub iterative: bool,
    /// In seconds.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,
    #[serde(default = "default_max_referrals")]
    pub max_referrals: usize,
    #[serde(default = "default_upstream_port")]
    pub upstream_port: u16,
}

impl ResolverConfig {
    /// Applies this configuration to `server`.
    pub fn configure(&self, server: &mut Server) {
        server.set_iterative(self.iterative);
        server.set_session_timeout(Duration::from_secs(self.session_timeout));
        server.set_max_referrals(self.max_referrals);
        server.set_upstream_port(self.upstream_port);
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            iterative: default_iterative(),
            session_timeout: default_session_timeout(),
            max_referrals: default_max_referrals(),
            upstream_port: default_upstream_port(),
        }
    }
}

fn default_iterative() -> bool {
    true
}

fn default_session_timeout() -> u64 {
    DEFAULT_SESSION_TIMEOUT.as_secs()
}

fn default_max_referrals() -> usize {
    DEFAULT_MAX_REFERRALS
}

fn default_upstream_port() -> u16 {
    DEFAULT_UPSTREAM_PORT
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: ZONES                                       //
////////////////////////////////////////////////////////////////////////

/// The configuration of a single zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    pub apex: ConfigName,
    /// The TTL of records that don't give one.
    pub ttl: Option<u32>,
    #[serde(default)]
    pub records: Vec<RecordConfig>,
    #[serde(default)]
    pub ptr: Vec<PtrConfig>,
}

/// Records at one name in a zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordConfig {
    /// The owner, relative to the apex. Empty (the default) means the
    /// apex itself.
    #[serde(default)]
    pub name: String,
    pub ip: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub ns: Option<ConfigName>,
    pub cname: Option<ConfigName>,
    pub txt: Option<Vec<String>>,
    pub mx: Option<MxConfig>,
    pub ttl: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MxConfig {
    pub preference: u16,
    pub exchange: ConfigName,
}

/// A PTR record, given by the address it maps back from.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PtrConfig {
    pub ip: Ipv4Addr,
    pub target: ConfigName,
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER HOPPER TYPES FOR SERDE                               //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`hopper`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over a [`hopper`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
