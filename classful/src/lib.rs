#![doc(issue_tracker_base_url = "https://github.com/chainbound/classful/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use classful_common::*;
pub use classful_filter::*;
pub use classful_sched::*;
