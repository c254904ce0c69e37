mod job_id;
pub use job_id::{BatchId, JobId};

mod job;
pub use job::{Job, display_name};

mod job_exit;
pub use job_exit::{JobExit, LAUNCH_FAILED_CODE};

mod batch;
pub use batch::{BatchResult, BatchSummary};

mod script_policy;
pub use script_policy::{Rejection, Screening, ScriptPolicy};

mod script_list;
pub use script_list::ScriptList;
