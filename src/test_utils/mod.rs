pub(crate) mod mocks;

pub(crate) use mocks::*;
