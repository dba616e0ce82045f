use std::sync::OnceLock;

use amf::{AmfReadError, Shape, ShapeBuilder, Value, impl_amf_class};
use chrono::Utc;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use tracing::warn;
use uuid::Uuid;

/// Header carrying the id the server assigned to a client.
pub const DS_ID_HEADER: &str = "DSId";
/// Header naming the endpoint a message went through.
pub const ENDPOINT_HEADER: &str = "DSEndpoint";

pub const ASYNC_MESSAGE: &str = "flex.messaging.messages.AsyncMessage";
pub const ACKNOWLEDGE_MESSAGE: &str = "flex.messaging.messages.AcknowledgeMessage";
pub const COMMAND_MESSAGE: &str = "flex.messaging.messages.CommandMessage";
pub const ERROR_MESSAGE: &str = "flex.messaging.messages.ErrorMessage";
pub const REMOTING_MESSAGE: &str = "flex.messaging.messages.RemotingMessage";

/// Members every message carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBase {
    pub client_id: Option<String>,
    pub destination: String,
    pub message_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Milliseconds, 0 for no expiry.
    pub time_to_live: i64,
    pub body: Value,
    pub headers: Vec<(String, Value)>,
}

impl MessageBase {
    /// A base with a fresh message id, stamped now.
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            message_id: Uuid::new_v4().to_string().to_uppercase(),
            timestamp: Utc::now().timestamp_millis(),
            ..Default::default()
        }
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.headers.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.headers.push((name, value)),
        }
    }
}

/// Access to the members shared by all message types.
pub trait Message {
    fn base(&self) -> &MessageBase;

    fn base_mut(&mut self) -> &mut MessageBase;

    /// The id of the message this one answers, if any.
    fn correlation_id(&self) -> Option<&str> {
        None
    }
}

/// Messages answering or following up another message.
trait Correlated: Message {
    fn correlation(&self) -> &Option<String>;

    fn correlation_mut(&mut self) -> &mut Option<String>;
}

macro_rules! impl_message {
    ($ty:ty) => {
        impl Message for $ty {
            fn base(&self) -> &MessageBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut MessageBase {
                &mut self.base
            }
        }
    };
    ($ty:ty, correlated) => {
        impl Message for $ty {
            fn base(&self) -> &MessageBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut MessageBase {
                &mut self.base
            }

            fn correlation_id(&self) -> Option<&str> {
                self.correlation_id.as_deref()
            }
        }

        impl Correlated for $ty {
            fn correlation(&self) -> &Option<String> {
                &self.correlation_id
            }

            fn correlation_mut(&mut self) -> &mut Option<String> {
                &mut self.correlation_id
            }
        }
    };
}

/// Null and missing strings read as empty.
fn lenient_string(value: Value) -> Result<String, AmfReadError> {
    Ok(value.convert::<Option<String>>()?.unwrap_or_default())
}

fn base_fields<T: Message>(builder: ShapeBuilder<T>) -> ShapeBuilder<T> {
    builder
        .field("body", |m| m.base().body.clone(), |m, v| Ok(m.base_mut().body = v))
        .field(
            "clientId",
            |m| m.base().client_id.clone().into(),
            |m, v| Ok(m.base_mut().client_id = v.convert()?),
        )
        .field(
            "destination",
            |m| m.base().destination.as_str().into(),
            |m, v| Ok(m.base_mut().destination = lenient_string(v)?),
        )
        .field(
            "headers",
            |m| m.base().headers.clone().into(),
            |m, v| Ok(m.base_mut().headers = v.convert()?),
        )
        .field(
            "messageId",
            |m| m.base().message_id.as_str().into(),
            |m, v| Ok(m.base_mut().message_id = lenient_string(v)?),
        )
        .field(
            "timestamp",
            |m| m.base().timestamp.into(),
            |m, v| Ok(m.base_mut().timestamp = v.convert()?),
        )
        .field(
            "timeToLive",
            |m| m.base().time_to_live.into(),
            |m, v| Ok(m.base_mut().time_to_live = v.convert()?),
        )
}

fn async_fields<T: Correlated>(builder: ShapeBuilder<T>) -> ShapeBuilder<T> {
    base_fields(builder).field(
        "correlationId",
        |m| m.correlation().clone().into(),
        |m, v| Ok(*m.correlation_mut() = v.convert()?),
    )
}

/// A published or pushed message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsyncMessage {
    pub base: MessageBase,
    pub correlation_id: Option<String>,
}

impl AsyncMessage {
    pub fn new(destination: impl Into<String>, body: Value) -> Self {
        let mut base = MessageBase::new(destination);
        base.body = body;
        Self {
            base,
            correlation_id: None,
        }
    }
}

impl_message!(AsyncMessage, correlated);

fn async_shape() -> &'static Shape<AsyncMessage> {
    static SHAPE: OnceLock<Shape<AsyncMessage>> = OnceLock::new();
    SHAPE.get_or_init(|| async_fields(Shape::<AsyncMessage>::builder(ASYNC_MESSAGE)).build())
}

impl_amf_class!(AsyncMessage, async_shape());

/// The successful answer to a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcknowledgeMessage {
    pub base: MessageBase,
    pub correlation_id: Option<String>,
}

impl AcknowledgeMessage {
    /// Acknowledge `request`, echoing its client and destination.
    pub fn for_message(request: &impl Message) -> Self {
        let mut base = MessageBase::new(request.base().destination.clone());
        base.client_id = request.base().client_id.clone();
        Self {
            base,
            correlation_id: Some(request.base().message_id.clone()),
        }
    }
}

impl_message!(AcknowledgeMessage, correlated);

fn acknowledge_shape() -> &'static Shape<AcknowledgeMessage> {
    static SHAPE: OnceLock<Shape<AcknowledgeMessage>> = OnceLock::new();
    SHAPE.get_or_init(|| {
        async_fields(Shape::<AcknowledgeMessage>::builder(ACKNOWLEDGE_MESSAGE)).build()
    })
}

impl_amf_class!(AcknowledgeMessage, acknowledge_shape());

/// Command operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive)]
#[repr(u32)]
pub enum CommandOperation {
    Subscribe = 0,
    Unsubscribe = 1,
    Poll = 2,
    ClientSync = 4,
    ClientPing = 5,
    DataUpdate = 7,
    Login = 8,
    Logout = 9,
    InvalidateSubscription = 10,
    ChannelDisconnected = 12,
    #[default]
    Unknown = 10000,
}

/// A control message: subscription management, polling, login and so on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandMessage {
    pub base: MessageBase,
    pub correlation_id: Option<String>,
    pub operation: CommandOperation,
}

impl CommandMessage {
    pub fn new(operation: CommandOperation) -> Self {
        Self {
            base: MessageBase::new(""),
            correlation_id: None,
            operation,
        }
    }
}

impl_message!(CommandMessage, correlated);

fn command_shape() -> &'static Shape<CommandMessage> {
    static SHAPE: OnceLock<Shape<CommandMessage>> = OnceLock::new();
    SHAPE.get_or_init(|| {
        async_fields(Shape::<CommandMessage>::builder(COMMAND_MESSAGE))
            .field(
                "operation",
                |m| (m.operation as u32).into(),
                |m, v| {
                    let code: u32 = v.convert()?;
                    m.operation = CommandOperation::from_u32(code).unwrap_or_else(|| {
                        warn!(code, "unknown command operation");
                        CommandOperation::Unknown
                    });
                    Ok(())
                },
            )
            .build()
    })
}

impl_amf_class!(CommandMessage, command_shape());

/// The failed answer to a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorMessage {
    pub base: MessageBase,
    pub correlation_id: Option<String>,
    pub fault_code: String,
    pub fault_string: String,
    pub fault_detail: Option<String>,
    pub root_cause: Value,
    pub extended_data: Vec<(String, Value)>,
}

impl ErrorMessage {
    /// A fault answering `request`.
    pub fn for_message(
        request: &impl Message,
        fault_code: impl Into<String>,
        fault_string: impl Into<String>,
    ) -> Self {
        let ack = AcknowledgeMessage::for_message(request);
        Self {
            base: ack.base,
            correlation_id: ack.correlation_id,
            fault_code: fault_code.into(),
            fault_string: fault_string.into(),
            ..Default::default()
        }
    }
}

impl_message!(ErrorMessage, correlated);

fn error_shape() -> &'static Shape<ErrorMessage> {
    static SHAPE: OnceLock<Shape<ErrorMessage>> = OnceLock::new();
    SHAPE.get_or_init(|| {
        async_fields(Shape::<ErrorMessage>::builder(ERROR_MESSAGE))
            .field(
                "faultCode",
                |m| m.fault_code.as_str().into(),
                |m, v| Ok(m.fault_code = lenient_string(v)?),
            )
            .field(
                "faultString",
                |m| m.fault_string.as_str().into(),
                |m, v| Ok(m.fault_string = lenient_string(v)?),
            )
            .field(
                "faultDetail",
                |m| m.fault_detail.clone().into(),
                |m, v| Ok(m.fault_detail = v.convert()?),
            )
            .field("rootCause", |m| m.root_cause.clone(), |m, v| Ok(m.root_cause = v))
            .field(
                "extendedData",
                |m| m.extended_data.clone().into(),
                |m, v| Ok(m.extended_data = v.convert()?),
            )
            .build()
    })
}

impl_amf_class!(ErrorMessage, error_shape());

/// A remote procedure call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotingMessage {
    pub base: MessageBase,
    pub operation: String,
    pub source: Option<String>,
}

impl RemotingMessage {
    /// Call `operation` on `destination` with positional arguments.
    pub fn new(
        destination: impl Into<String>,
        operation: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        let mut base = MessageBase::new(destination);
        base.body = Value::array(args);
        Self {
            base,
            operation: operation.into(),
            source: None,
        }
    }
}

impl_message!(RemotingMessage);

fn remoting_shape() -> &'static Shape<RemotingMessage> {
    static SHAPE: OnceLock<Shape<RemotingMessage>> = OnceLock::new();
    SHAPE.get_or_init(|| {
        base_fields(Shape::<RemotingMessage>::builder(REMOTING_MESSAGE))
            .field(
                "operation",
                |m| m.operation.as_str().into(),
                |m, v| Ok(m.operation = lenient_string(v)?),
            )
            .field(
                "source",
                |m| m.source.clone().into(),
                |m, v| Ok(m.source = v.convert()?),
            )
            .build()
    })
}

impl_amf_class!(RemotingMessage, remoting_shape());
