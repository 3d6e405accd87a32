//! Package service contract.
//!
//! The package service is the external collaborator that knows which
//! packages the project resolves to and can embed, remove and re-resolve
//! them. Its calls do not block: each returns a [`Request`] handle that the
//! caller polls until it reports success or failure.

mod local;

use std::fmt;
use std::path::PathBuf;

use tokio::sync::oneshot::{self, error::TryRecvError};

pub use local::LocalPackageService;

/// Operations the package service performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Embed,
    Remove,
    Resolve,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::List => "list",
            Operation::Embed => "embed",
            Operation::Remove => "remove",
            Operation::Resolve => "resolve",
        })
    }
}

/// Where the service resolved a package from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageSource {
    Registry,
    BuiltIn,
    Embedded,
    Local,
    Git,
}

/// A package as reported by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub source: PackageSource,
    pub resolved_path: PathBuf,
    /// `<name>@<source>` identifier.
    pub package_id: String,
}

impl PackageDescriptor {
    /// The manifest-style source string currently in effect for this package.
    ///
    /// Registry and built-in packages report their version, local packages a
    /// `file:` path, git packages the part of the id after `@`.
    pub fn source_string(&self) -> String {
        match self.source {
            PackageSource::Registry | PackageSource::BuiltIn => self.version.clone(),
            PackageSource::Embedded => format!("Embedded: {}", self.resolved_path.display()),
            PackageSource::Local => format!("file:{}", self.resolved_path.display()),
            PackageSource::Git => match self.package_id.split_once('@') {
                Some((_, source)) => source.to_string(),
                None => self.package_id.clone(),
            },
        }
    }
}

/// Poll result of a [`Request`].
#[derive(Debug, PartialEq)]
pub enum RequestStatus<T> {
    InProgress,
    Success(T),
    Failure(String),
}

/// Handle to an in-flight package service operation.
#[derive(Debug)]
pub struct Request<T> {
    operation: Operation,
    receiver: oneshot::Receiver<Result<T, String>>,
}

/// Producer side of a [`Request`]; consumed when the outcome is reported.
#[derive(Debug)]
pub struct Completer<T> {
    sender: oneshot::Sender<Result<T, String>>,
}

impl<T> Request<T> {
    /// Create a pending request and the completer that finishes it.
    pub fn channel(operation: Operation) -> (Completer<T>, Request<T>) {
        let (sender, receiver) = oneshot::channel();
        (Completer { sender }, Request { operation, receiver })
    }

    /// Create a request that is already complete.
    pub fn ready(operation: Operation, result: Result<T, String>) -> Request<T> {
        let (completer, request) = Self::channel(operation);
        completer.complete(result);
        request
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Check for completion without blocking.
    ///
    /// Once `Success` or `Failure` has been returned the request is spent.
    /// A request whose completer was dropped without answering is a failure.
    pub fn poll(&mut self) -> RequestStatus<T> {
        match self.receiver.try_recv() {
            Ok(Ok(value)) => RequestStatus::Success(value),
            Ok(Err(message)) => RequestStatus::Failure(message),
            Err(TryRecvError::Empty) => RequestStatus::InProgress,
            Err(TryRecvError::Closed) => {
                RequestStatus::Failure("operation abandoned before completing".to_string())
            }
        }
    }
}

impl<T> Completer<T> {
    pub fn complete(self, result: Result<T, String>) {
        // The requester may already be gone (teardown); nothing to report then.
        let _ = self.sender.send(result);
    }
}

/// The external package service.
#[cfg_attr(test, mockall::automock)]
pub trait PackageService {
    /// List the packages the project currently resolves to.
    fn list(&self, include_indirect: bool) -> Request<Vec<PackageDescriptor>>;

    /// Copy a package into the embedded package directory.
    fn embed(&self, name: &str) -> Request<()>;

    /// Remove a package's embedded copy.
    fn remove(&self, name: &str) -> Request<()>;

    /// Ask for the dependency set to be re-resolved. Fire-and-forget.
    fn resolve(&self);
}
