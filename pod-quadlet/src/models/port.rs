use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use crate::error::Error;

static PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:((?:[0-9]{1,3}(?:\.[0-9]{1,3}){3})|\[.+?\]):)?",
        r"([0-9]+(?:-[0-9]+)?)",
        r"(?::([0-9]+(?:-[0-9]+)?))?",
        r"(?:/(tcp|udp))?$",
    ))
    .expect("invalid port regex")
});

const DEFAULT_IP: &str = "0.0.0.0";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
    pub is_range: bool,
}

impl PortRange {
    pub fn single(port: u16) -> PortRange {
        PortRange {
            start: port,
            end: port,
            is_range: false,
        }
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }

    fn parse(s: &str, input: &str) -> Result<PortRange, Error> {
        let invalid = || Error::MalformedInput(format!("invalid port format: {}", input));
        let number = |s: &str| s.parse::<u16>().map_err(|_| invalid());

        match s.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (number(start)?, number(end)?);
                if start > end {
                    return Err(invalid());
                }
                Ok(PortRange {
                    start,
                    end,
                    is_range: true,
                })
            }
            None => number(s).map(PortRange::single),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_range {
            write!(f, "{}-{}", self.start, self.end)
        } else {
            write!(f, "{}", self.start)
        }
    }
}

/// A published port, `[ip:]host[-host][:container[-container]][/protocol]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortMap {
    pub ip: String,
    pub host: PortRange,
    pub container: PortRange,
    pub protocol: Protocol,
}

impl PortMap {
    pub fn parse(input: &str) -> Result<PortMap, Error> {
        let captures = PORT
            .captures(input)
            .ok_or_else(|| Error::MalformedInput(format!("invalid port format: {}", input)))?;

        let host = PortRange::parse(&captures[2], input)?;
        // Without a container side the container mirrors the host ports.
        let container = match captures.get(3) {
            Some(container) => PortRange::parse(container.as_str(), input)?,
            None => host,
        };

        let protocol = match captures.get(4).map(|m| m.as_str()) {
            Some("udp") => Protocol::Udp,
            _ => Protocol::Tcp,
        };

        Ok(PortMap {
            ip: captures
                .get(1)
                .map(|m| m.as_str())
                .unwrap_or(DEFAULT_IP)
                .to_owned(),
            host,
            container,
            protocol,
        })
    }
}

impl FromStr for PortMap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PortMap::parse(s)
    }
}

impl fmt::Display for PortMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}/{}",
            self.ip,
            self.host,
            self.container,
            self.protocol.as_str()
        )
    }
}

impl Hash for PortMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}
