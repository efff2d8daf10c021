//! Data models for the asset graph.

pub mod asset;
pub mod relation;

pub use asset::{
    Asset, AssetType, Autnum, AutnumRecord, DomainRecord, EmailAddress, Fqdn, IpAddress,
    IpNetRecord, IpVersion, Location, Netblock, Organization, Person, PhoneNumber, Source,
    TlsCertificate, Url,
};
pub use relation::{Relation, RelationLabel};
