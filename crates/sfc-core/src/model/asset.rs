//! Asset data model for the discovered-knowledge graph.
//!
//! Assets are the typed nodes of the graph: domain names, addresses,
//! netblocks, autonomous systems, registration records, and the contact
//! details hanging off them. Every asset derives a canonical natural key
//! through [`Asset::key`]; the graph store deduplicates on
//! `(asset type, natural key)`.

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Type tag for an asset variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Fqdn,
    IpAddress,
    Netblock,
    Autnum,
    DomainRecord,
    AutnumRecord,
    IpNetRecord,
    Person,
    Organization,
    Location,
    PhoneNumber,
    EmailAddress,
    TlsCertificate,
    Url,
    Source,
}

impl AssetType {
    /// Returns the stable string form used in logs and serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Fqdn => "fqdn",
            AssetType::IpAddress => "ip_address",
            AssetType::Netblock => "netblock",
            AssetType::Autnum => "autnum",
            AssetType::DomainRecord => "domain_record",
            AssetType::AutnumRecord => "autnum_record",
            AssetType::IpNetRecord => "ipnet_record",
            AssetType::Person => "person",
            AssetType::Organization => "organization",
            AssetType::Location => "location",
            AssetType::PhoneNumber => "phone_number",
            AssetType::EmailAddress => "email_address",
            AssetType::TlsCertificate => "tls_certificate",
            AssetType::Url => "url",
            AssetType::Source => "source",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully qualified domain name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fqdn {
    /// The domain name, stored lower-cased without a trailing dot.
    pub name: String,
}

impl Fqdn {
    /// Creates an FQDN asset, folding the name to lower case.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
        }
    }
}

/// IP protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    V4,
    V6,
}

/// A single IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    /// The address value.
    pub address: IpAddr,
    /// Protocol family of the address.
    pub version: IpVersion,
}

impl IpAddress {
    /// Creates an address asset, deriving the family from the value.
    pub fn new(address: IpAddr) -> Self {
        let version = match address {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        };
        Self { address, version }
    }
}

/// A CIDR netblock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Netblock {
    /// The network in CIDR notation.
    pub cidr: IpNet,
}

/// An autonomous system number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Autnum {
    /// The AS number.
    pub number: u32,
}

/// A WHOIS/RDAP domain registration record.
///
/// Registry date fields are kept as the raw strings returned by the
/// registry; WHOIS date formats are too inconsistent to parse reliably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DomainRecord {
    /// The registered domain name.
    pub domain: String,
    /// Registry handle or record name.
    pub name: String,
    /// Sponsoring registrar.
    pub registrar: String,
    /// Expiration date as reported by the registry.
    pub expiration_date: String,
    /// Creation date as reported by the registry.
    pub created_date: String,
    /// Last update date as reported by the registry.
    pub updated_date: String,
    /// EPP status values.
    pub status: Vec<String>,
}

/// An RDAP autonomous-system registration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AutnumRecord {
    /// The AS number the record describes.
    pub number: u32,
    /// Registry handle (e.g. `AS64496`).
    pub handle: String,
    /// Network name.
    pub name: String,
    /// Registry status values.
    pub status: Vec<String>,
    /// Last update date as reported by the registry.
    pub updated_date: String,
}

/// An RDAP IP-network registration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpNetRecord {
    /// The network in CIDR notation.
    pub cidr: IpNet,
    /// Registry handle.
    pub handle: String,
    /// Network name.
    pub name: String,
    /// Registry status values.
    pub status: Vec<String>,
    /// Last update date as reported by the registry.
    pub updated_date: String,
}

/// A natural person appearing in registration contact data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Full name as it appears in the record.
    pub full_name: String,
}

/// An organization appearing in registration data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization name.
    pub name: String,
}

/// A postal address appearing in registration contact data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// The address in a single formatted line.
    pub address: String,
}

/// A phone number appearing in registration contact data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    /// The number exactly as recorded.
    pub raw: String,
}

/// An email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// The address, stored lower-cased.
    pub address: String,
}

impl EmailAddress {
    /// Creates an email asset, folding the address to lower case.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into().to_lowercase(),
        }
    }
}

/// An observed TLS certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsCertificate {
    /// Certificate serial number in hex.
    pub serial_number: String,
    /// Subject common name.
    pub subject_common_name: String,
    /// Issuer common name.
    pub issuer_common_name: String,
    /// Validity start.
    pub not_before: Option<DateTime<Utc>>,
    /// Validity end.
    pub not_after: Option<DateTime<Utc>>,
}

/// A URL observed during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    /// The URL string.
    pub url: String,
}

/// The origin data feed for a piece of discovered information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Stable source name (matches the plugin name).
    pub name: String,
    /// Confidence assigned to facts from this source, in [0, 100].
    pub confidence: u8,
}

/// A typed node in the discovered-knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Asset {
    Fqdn(Fqdn),
    IpAddress(IpAddress),
    Netblock(Netblock),
    Autnum(Autnum),
    DomainRecord(DomainRecord),
    AutnumRecord(AutnumRecord),
    IpNetRecord(IpNetRecord),
    Person(Person),
    Organization(Organization),
    Location(Location),
    PhoneNumber(PhoneNumber),
    EmailAddress(EmailAddress),
    TlsCertificate(TlsCertificate),
    Url(Url),
    Source(Source),
}

impl Asset {
    /// Returns the type tag for this asset.
    pub fn asset_type(&self) -> AssetType {
        match self {
            Asset::Fqdn(_) => AssetType::Fqdn,
            Asset::IpAddress(_) => AssetType::IpAddress,
            Asset::Netblock(_) => AssetType::Netblock,
            Asset::Autnum(_) => AssetType::Autnum,
            Asset::DomainRecord(_) => AssetType::DomainRecord,
            Asset::AutnumRecord(_) => AssetType::AutnumRecord,
            Asset::IpNetRecord(_) => AssetType::IpNetRecord,
            Asset::Person(_) => AssetType::Person,
            Asset::Organization(_) => AssetType::Organization,
            Asset::Location(_) => AssetType::Location,
            Asset::PhoneNumber(_) => AssetType::PhoneNumber,
            Asset::EmailAddress(_) => AssetType::EmailAddress,
            Asset::TlsCertificate(_) => AssetType::TlsCertificate,
            Asset::Url(_) => AssetType::Url,
            Asset::Source(_) => AssetType::Source,
        }
    }

    /// Returns the canonical natural key for this asset.
    ///
    /// Two live assets of the same type with equal keys are the same
    /// graph node; the store upserts on this value.
    pub fn key(&self) -> String {
        match self {
            Asset::Fqdn(f) => f.name.to_lowercase(),
            Asset::IpAddress(ip) => ip.address.to_string(),
            Asset::Netblock(nb) => nb.cidr.to_string(),
            Asset::Autnum(a) => a.number.to_string(),
            Asset::DomainRecord(r) => r.domain.to_lowercase(),
            Asset::AutnumRecord(r) => r.handle.clone(),
            Asset::IpNetRecord(r) => r.cidr.to_string(),
            Asset::Person(p) => p.full_name.clone(),
            Asset::Organization(o) => o.name.clone(),
            Asset::Location(l) => l.address.clone(),
            Asset::PhoneNumber(p) => p.raw.clone(),
            Asset::EmailAddress(e) => e.address.to_lowercase(),
            Asset::TlsCertificate(c) => c.serial_number.clone(),
            Asset::Url(u) => u.url.clone(),
            Asset::Source(s) => s.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fqdn_key_is_lowercase() {
        let asset = Asset::Fqdn(Fqdn::new("WWW.Example.COM"));
        assert_eq!(asset.key(), "www.example.com");
        assert_eq!(asset.asset_type(), AssetType::Fqdn);
    }

    #[test]
    fn test_ip_address_family() {
        let v4 = IpAddress::new("192.0.2.1".parse().unwrap());
        assert_eq!(v4.version, IpVersion::V4);

        let v6 = IpAddress::new("2001:db8::1".parse().unwrap());
        assert_eq!(v6.version, IpVersion::V6);
    }

    #[test]
    fn test_netblock_key_is_cidr_string() {
        let cidr: IpNet = "198.51.100.0/24".parse().unwrap();
        let asset = Asset::Netblock(Netblock { cidr });
        assert_eq!(asset.key(), "198.51.100.0/24");
    }

    #[test]
    fn test_autnum_record_key_is_handle() {
        let asset = Asset::AutnumRecord(AutnumRecord {
            number: 64496,
            handle: "AS64496".to_string(),
            name: "EXAMPLE-AS".to_string(),
            status: vec!["active".to_string()],
            updated_date: "2024-01-01".to_string(),
        });
        assert_eq!(asset.key(), "AS64496");
    }

    #[test]
    fn test_asset_serde_round_trip() {
        let asset = Asset::Source(Source {
            name: "ZETAlytics".to_string(),
            confidence: 100,
        });
        let json = serde_json::to_string(&asset).unwrap();
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(asset, back);
    }
}
