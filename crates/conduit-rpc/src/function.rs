//! Function, callback and return-value shapes.
//!
//! A registered function returns nothing, a single value, or an ordered
//! sequence of values. The shape is fixed when the function is registered
//! and checked once on the client before a call is enqueued. Callbacks of
//! asynchronous calls come in the same three shapes, and the callback's
//! shape selects which call variant is made.

use crate::error::CallError;
use std::fmt;
use std::hash::Hash;

/// Identifier a function is registered under.
///
/// Any hashable, comparable value works: a name, a message type tag, an
/// enum discriminant.
pub trait FunctionId: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> FunctionId for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// The return shape of a function or callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Returns nothing.
    NoResult,
    /// Returns one value.
    Single,
    /// Returns an ordered sequence of values.
    Sequence,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::NoResult => write!(f, "no result"),
            Shape::Single => write!(f, "single value"),
            Shape::Sequence => write!(f, "sequence"),
        }
    }
}

/// A function owned by a server and executed on its draining thread.
///
/// Functions are `FnMut` because only the draining thread ever runs them,
/// which lets a function own and mutate module state directly.
pub enum Function<A, R> {
    /// `(args) -> ()`
    NoResult(Box<dyn FnMut(A) + Send>),
    /// `(args) -> value`
    Single(Box<dyn FnMut(A) -> R + Send>),
    /// `(args) -> [values]`
    Sequence(Box<dyn FnMut(A) -> Vec<R> + Send>),
}

impl<A, R> Function<A, R> {
    /// Wraps a function that returns nothing.
    pub fn no_result(f: impl FnMut(A) + Send + 'static) -> Self {
        Function::NoResult(Box::new(f))
    }

    /// Wraps a function that returns one value.
    pub fn single(f: impl FnMut(A) -> R + Send + 'static) -> Self {
        Function::Single(Box::new(f))
    }

    /// Wraps a function that returns a sequence of values.
    pub fn sequence(f: impl FnMut(A) -> Vec<R> + Send + 'static) -> Self {
        Function::Sequence(Box::new(f))
    }

    /// Returns the function's shape.
    pub fn shape(&self) -> Shape {
        match self {
            Function::NoResult(_) => Shape::NoResult,
            Function::Single(_) => Shape::Single,
            Function::Sequence(_) => Shape::Sequence,
        }
    }

    pub(crate) fn call(&mut self, args: A) -> Value<R> {
        match self {
            Function::NoResult(f) => {
                f(args);
                Value::None
            }
            Function::Single(f) => Value::Single(f(args)),
            Function::Sequence(f) => Value::Sequence(f(args)),
        }
    }
}

impl<A, R> fmt::Debug for Function<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Function").field(&self.shape()).finish()
    }
}

/// The value produced by one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<R> {
    /// The function returns nothing.
    None,
    /// A single value.
    Single(R),
    /// An ordered sequence of values.
    Sequence(Vec<R>),
}

impl<R> Value<R> {
    /// Returns the shape this value was produced by.
    pub fn shape(&self) -> Shape {
        match self {
            Value::None => Shape::NoResult,
            Value::Single(_) => Shape::Single,
            Value::Sequence(_) => Shape::Sequence,
        }
    }

    /// Unwraps a single value.
    pub fn into_single(self) -> Result<R, CallError> {
        match self {
            Value::Single(v) => Ok(v),
            other => Err(unexpected(Shape::Single, other.shape())),
        }
    }

    /// Unwraps a sequence of values.
    pub fn into_sequence(self) -> Result<Vec<R>, CallError> {
        match self {
            Value::Sequence(v) => Ok(v),
            other => Err(unexpected(Shape::Sequence, other.shape())),
        }
    }
}

fn unexpected(expected: Shape, actual: Shape) -> CallError {
    CallError::Fault(format!("expected {} result, got {}", expected, actual))
}

/// Callback attached to an asynchronous call.
///
/// Callbacks travel with the call record through the server and back, so
/// they must be `Send`. They run on the thread that resolves the client.
pub enum Callback<R> {
    /// Receives only the failure, if any.
    NoResult(Box<dyn FnOnce(Result<(), CallError>) + Send>),
    /// Receives one value or the failure.
    Single(Box<dyn FnOnce(Result<R, CallError>) + Send>),
    /// Receives a sequence of values or the failure.
    Sequence(Box<dyn FnOnce(Result<Vec<R>, CallError>) + Send>),
}

impl<R> Callback<R> {
    /// Wraps a callback for a function that returns nothing.
    pub fn no_result(f: impl FnOnce(Result<(), CallError>) + Send + 'static) -> Self {
        Callback::NoResult(Box::new(f))
    }

    /// Wraps a callback for a function that returns one value.
    pub fn single(f: impl FnOnce(Result<R, CallError>) + Send + 'static) -> Self {
        Callback::Single(Box::new(f))
    }

    /// Wraps a callback for a function that returns a sequence.
    pub fn sequence(f: impl FnOnce(Result<Vec<R>, CallError>) + Send + 'static) -> Self {
        Callback::Sequence(Box::new(f))
    }

    /// Returns the shape of function this callback expects.
    pub fn shape(&self) -> Shape {
        match self {
            Callback::NoResult(_) => Shape::NoResult,
            Callback::Single(_) => Shape::Single,
            Callback::Sequence(_) => Shape::Sequence,
        }
    }

    /// Invokes the callback with an outcome.
    pub fn invoke(self, outcome: Result<Value<R>, CallError>) {
        match self {
            Callback::NoResult(cb) => cb(outcome.map(|_| ())),
            Callback::Single(cb) => cb(outcome.and_then(Value::into_single)),
            Callback::Sequence(cb) => cb(outcome.and_then(Value::into_sequence)),
        }
    }
}

impl<R> fmt::Debug for Callback<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.shape()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_function_shapes() {
        assert_eq!(Function::<(), i32>::no_result(|_| {}).shape(), Shape::NoResult);
        assert_eq!(Function::<(), i32>::single(|_| 1).shape(), Shape::Single);
        assert_eq!(Function::<(), i32>::sequence(|_| vec![1, 2]).shape(), Shape::Sequence);
    }

    #[test]
    fn test_function_call_keeps_state() {
        let mut total = 0;
        let mut f = Function::<i32, i32>::single(move |n| {
            total += n;
            total
        });

        assert_eq!(f.call(2), Value::Single(2));
        assert_eq!(f.call(3), Value::Single(5));
    }

    #[test]
    fn test_callback_single_receives_value() {
        let (tx, rx) = mpsc::channel();
        let cb = Callback::<String>::single(move |r| tx.send(r).unwrap());

        cb.invoke(Ok(Value::Single("hi".to_string())));
        assert_eq!(rx.recv().unwrap(), Ok("hi".to_string()));
    }

    #[test]
    fn test_callback_sequence_receives_failure() {
        let (tx, rx) = mpsc::channel();
        let cb = Callback::<u8>::sequence(move |r| tx.send(r).unwrap());

        cb.invoke(Err(CallError::ServerClosed));
        assert_eq!(rx.recv().unwrap(), Err(CallError::ServerClosed));
    }

    #[test]
    fn test_callback_no_result_discards_value() {
        let (tx, rx) = mpsc::channel();
        let cb = Callback::<u8>::no_result(move |r| tx.send(r).unwrap());

        cb.invoke(Ok(Value::Single(9)));
        assert_eq!(rx.recv().unwrap(), Ok(()));
    }

    #[test]
    fn test_value_shape_mismatch_is_a_failure() {
        let err = Value::<u8>::None.into_single().unwrap_err();
        assert!(matches!(err, CallError::Fault(_)));
        assert_eq!(Value::Sequence(vec![1u8, 2]).into_sequence(), Ok(vec![1, 2]));
    }
}
