//! Integration tests for the rdebug library

mod test_archive;
mod test_fsm;
mod test_registry;
mod test_session;
