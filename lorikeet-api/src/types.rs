use crate::errors::ProcessError;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;

// Type aliases for common types
pub type BoxedMessage = Box<dyn Any + Send>;
pub type ProcessResult<T> = Result<T, ProcessError>;
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
