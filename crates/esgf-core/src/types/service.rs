//! Access service descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, InvalidInputError};

/// A data access service offered by a data node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Service {
    HttpServer,
    OpenDap,
    GridFtp,
    Globus,
    Las,
    Other(String),
}

impl Service {
    /// Map a service name as published by the index to a variant.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "httpserver" | "http" => Service::HttpServer,
            "opendap" | "opendap-html" => Service::OpenDap,
            "gridftp" => Service::GridFtp,
            "globus" => Service::Globus,
            "las" => Service::Las,
            _ => Service::Other(name.trim().to_string()),
        }
    }

    /// Returns the published service name.
    pub fn name(&self) -> &str {
        match self {
            Service::HttpServer => "HTTPServer",
            Service::OpenDap => "OPENDAP",
            Service::GridFtp => "GridFTP",
            Service::Globus => "Globus",
            Service::Las => "LAS",
            Service::Other(name) => name,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One `url|mime|service` entry of a record's `url` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// The access URL.
    pub url: String,
    /// The advertised MIME type.
    pub mime_type: String,
    /// The access service.
    pub service: Service,
}

impl FromStr for ServiceEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '|');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(url), Some(mime), Some(service)) if !url.trim().is_empty() => {
                Ok(ServiceEndpoint {
                    url: url.trim().to_string(),
                    mime_type: mime.trim().to_string(),
                    service: Service::from_name(service),
                })
            }
            _ => Err(InvalidInputError::Other {
                message: format!("'{}' is not a url|mime|service descriptor", s),
            }
            .into()),
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.url, self.mime_type, self.service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descriptor() {
        let ep: ServiceEndpoint =
            "http://dn.example/thredds/dodsC/a.nc.html|application/opendap-html|OPENDAP"
                .parse()
                .unwrap();
        assert_eq!(ep.service, Service::OpenDap);
        assert_eq!(ep.mime_type, "application/opendap-html");
        assert_eq!(
            ep.to_string(),
            "http://dn.example/thredds/dodsC/a.nc.html|application/opendap-html|OPENDAP"
        );
    }

    #[test]
    fn unknown_service_is_preserved() {
        assert_eq!(
            Service::from_name("SRM"),
            Service::Other("SRM".to_string())
        );
        assert_eq!(Service::from_name("httpserver"), Service::HttpServer);
    }

    #[test]
    fn rejects_short_descriptor() {
        assert!("http://dn.example/a.nc".parse::<ServiceEndpoint>().is_err());
        assert!("|application/netcdf|HTTPServer".parse::<ServiceEndpoint>().is_err());
    }
}
