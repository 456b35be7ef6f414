use thiserror::Error;

use super::job::JobId;

#[derive(Debug, Error)]
pub enum Error {
	#[error("index scheduler was shutdown")]
	Shutdown,
	#[error("concurrent job canceled, background queue not ready <id='{0}'>")]
	ConcurrentJobCanceled(JobId),
}
