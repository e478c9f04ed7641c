pub mod notifications;
pub mod orchestrator;
pub mod outcome;
pub mod redacted;
pub mod result_error;
pub mod retention;
pub mod run_config;
pub mod storage;
pub mod tar;
#[cfg(test)]
pub(crate) mod testing;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
