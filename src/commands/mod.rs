pub(crate) mod license;
pub(crate) mod serve;
