// SyncTV vendor clients
//
// External media catalogs reachable either in-process (plain HTTP against the
// vendor's API) or through a remote vendor service over gRPC. Callers go
// through `VendorRegistry`, which picks a named remote backend when one is
// registered and the local client otherwise.

pub mod emby;
pub mod error;
pub mod proto;
pub mod registry;

pub use emby::{new_emby_grpc_client, EmbyError, EmbyInterface, EmbyService, GrpcEmbyClient};
pub use error::VendorError;
pub use registry::VendorRegistry;
