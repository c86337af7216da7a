use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::error::ConfigError;

/// A zone given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSpec {
    pub zone: String,
    pub records: HashMap<String, String>,
}

/// Parse `ZONE=NAME:IP[,NAME:IP...]`. The record list may be empty.
pub fn parse_zone_spec(s: &str) -> Result<ZoneSpec, ConfigError> {
    let (zone, records) = s
        .split_once('=')
        .ok_or_else(|| ConfigError::Malformed(s.to_string()))?;

    let zone = zone.trim();
    if zone.is_empty() {
        return Err(ConfigError::EmptyZone(s.to_string()));
    }

    let records = records
        .split(',')
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(parse_record)
        .collect::<Result<HashMap<_, _>, _>>()?;

    Ok(ZoneSpec {
        zone: zone.to_string(),
        records,
    })
}

fn parse_record(record: &str) -> Result<(String, String), ConfigError> {
    let (name, address) = record
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::BadRecord(record.to_string()))?;
    let (name, address) = (name.trim(), address.trim());

    if name.is_empty() {
        return Err(ConfigError::BadRecord(record.to_string()));
    }
    if address.parse::<Ipv4Addr>().is_err() {
        return Err(ConfigError::BadAddress {
            name: name.to_string(),
            address: address.to_string(),
        });
    }

    Ok((name.to_string(), address.to_string()))
}
