pub use self::{
    connection::Connection, dmo_response::DmoResponse, executor::Executor,
    executor_ext::ExecutorExt, tuple_response::TupleResponse,
};

mod connection;
mod dmo_response;
mod executor;
mod executor_ext;
mod tuple_response;

mod private {
    use crate::client::Connection;

    #[doc(hidden)]
    pub trait Sealed {}

    impl Sealed for Connection {}
    impl<S: Sealed + ?Sized> Sealed for &S {}
    impl<S: Sealed + ?Sized> Sealed for &mut S {}
}
