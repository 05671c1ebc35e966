//! LDAP transport backed by `ldap3`
//!
//! Handles plain LDAP and LDAPS connections. Each connection runs its own
//! driver task, which is aborted when the connection is dropped.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions};
use ssogate_core::{Error, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::endpoint::Endpoint;
use super::transport::{
    BindOutcome, ConnectOptions, Connection, Connector, DerefAliases, SearchRequest, SearchScope,
};

/// Opens real directory connections
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

#[async_trait]
impl Connector for Ldap3Connector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Connection>> {
        let mut settings = LdapConnSettings::new().set_conn_timeout(options.timeout);
        if endpoint.is_tls() && !options.verify_server_certificate {
            settings = settings.set_no_tls_verify(true);
        }

        let url = endpoint.to_string();
        debug!(url = %url, "Connecting to LDAP server");

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", url, e)))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        Ok(Box::new(Ldap3Connection {
            ldap,
            driver,
            timeout: options.timeout,
        }))
    }
}

struct Ldap3Connection {
    ldap: Ldap,
    driver: JoinHandle<()>,
    timeout: Duration,
}

#[async_trait]
impl Connection for Ldap3Connection {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindOutcome> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| Error::Connection(format!("bind failed: {}", e)))?;

        if result.rc == 0 {
            Ok(BindOutcome::Accepted)
        } else {
            Ok(BindOutcome::Rejected {
                code: result.rc,
                message: result.text,
            })
        }
    }

    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<String>> {
        let attrs: Vec<&str> = request.attributes.iter().map(String::as_str).collect();

        let (entries, _res) = self
            .ldap
            .with_search_options(SearchOptions::new().deref(to_ldap3_deref(request.deref)))
            .with_timeout(self.timeout)
            .search(
                &request.base_dn,
                to_ldap3_scope(request.scope),
                &request.filter,
                attrs,
            )
            .await
            .map_err(|e| Error::Directory(format!("search failed: {}", e)))?
            .success()
            .map_err(|e| Error::Directory(format!("search error: {}", e)))?;

        Ok(entries
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).dn)
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| Error::Connection(format!("unbind failed: {}", e)))
    }
}

impl Drop for Ldap3Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn to_ldap3_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

fn to_ldap3_deref(deref: DerefAliases) -> ldap3::DerefAliases {
    match deref {
        DerefAliases::Never => ldap3::DerefAliases::Never,
        DerefAliases::Searching => ldap3::DerefAliases::Searching,
        DerefAliases::Finding => ldap3::DerefAliases::Finding,
        DerefAliases::Always => ldap3::DerefAliases::Always,
    }
}
