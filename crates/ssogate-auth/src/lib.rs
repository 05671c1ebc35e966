//! Directory authentication for ssogate

pub mod ldap;

pub use ldap::{
    build_user_filter, escape_filter_value, normalize_url, BindOutcome, ConnectOptions,
    Connection, Connector, DerefAliases, DirectorySession, Endpoint, Ldap3Connector,
    LdapAuthenticator, Scheme, SearchRequest, SearchScope,
};
