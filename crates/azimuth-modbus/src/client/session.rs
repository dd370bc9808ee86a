// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! tokio-modbus sessions shared by the TCP and RTU transports.
//!
//! The two wire transports differ only in how a [`ModbusContext`] is opened.
//! That part is a [`Dialer`]; everything after it (deadlines, exception
//! mapping, dropping a dead context) lives in [`SessionTransport`].

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use azimuth_core::RegisterKind;
use tokio::sync::Mutex;
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tokio_modbus::client::{Client, Context as ModbusContext, Reader, Writer};
use tokio_modbus::{Error as TokioModbusError, ExceptionCode};

use crate::error::{ConnectionError, ModbusError, ModbusResult, ProtocolError, TimeoutError};

use super::transport::{
    expect_table, read_function_code, ModbusTransport, FC_WRITE_COIL, FC_WRITE_WORD, FC_WRITE_WORDS,
};

// =============================================================================
// Dialer
// =============================================================================

/// Opens a tokio-modbus context to the console.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Opens a fresh context.
    async fn dial(&self) -> ModbusResult<ModbusContext>;

    /// Endpoint for logs.
    fn endpoint(&self) -> String;

    /// Deadline for each read or write.
    fn operation_timeout(&self) -> Duration;
}

// =============================================================================
// SessionTransport
// =============================================================================

/// [`ModbusTransport`] over whatever context a [`Dialer`] opens.
pub struct SessionTransport<D> {
    pub(crate) dialer: D,
    session: Mutex<ModbusSession>,
    connected: AtomicBool,
}

impl<D: Dialer> SessionTransport<D> {
    pub(crate) fn from_dialer(dialer: D) -> Self {
        let session = ModbusSession::new(dialer.operation_timeout());
        Self {
            dialer,
            session: Mutex::new(session),
            connected: AtomicBool::new(false),
        }
    }

    fn observe<T>(&self, result: ModbusResult<T>) -> ModbusResult<T> {
        if matches!(&result, Err(e) if e.is_link_loss()) {
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl<D: Dialer> ModbusTransport for SessionTransport<D> {
    async fn connect(&mut self) -> ModbusResult<()> {
        let session = self.session.get_mut();
        if session.is_attached() {
            return Ok(());
        }

        let context = self.dialer.dial().await?;
        session.attach(context);
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(endpoint = %self.dialer.endpoint(), "Session opened");
        Ok(())
    }

    async fn disconnect(&mut self) -> ModbusResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        if self.session.get_mut().detach().await {
            tracing::debug!(endpoint = %self.dialer.endpoint(), "Session closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        self.dialer.endpoint()
    }

    async fn read_bits(&self, kind: RegisterKind, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        expect_table(kind, true)?;
        let result = self.session.lock().await.read_bits(kind, address, count).await;
        self.observe(result)
    }

    async fn read_words(&self, kind: RegisterKind, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        expect_table(kind, false)?;
        let result = self.session.lock().await.read_words(kind, address, count).await;
        self.observe(result)
    }

    async fn write_coil(&self, address: u16, value: bool) -> ModbusResult<()> {
        let result = self.session.lock().await.write_coil(address, value).await;
        self.observe(result)
    }

    async fn write_word(&self, address: u16, value: u16) -> ModbusResult<()> {
        let result = self.session.lock().await.write_word(address, value).await;
        self.observe(result)
    }

    async fn write_words(&self, address: u16, values: &[u16]) -> ModbusResult<()> {
        let result = self.session.lock().await.write_words(address, values).await;
        self.observe(result)
    }
}

impl<D: Dialer> fmt::Debug for SessionTransport<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTransport")
            .field("endpoint", &self.dialer.endpoint())
            .field("connected", &self.is_connected())
            .finish()
    }
}

// =============================================================================
// ModbusSession
// =============================================================================

type Reply<T> = Result<Result<Result<T, ExceptionCode>, TokioModbusError>, Elapsed>;

/// An optional live context plus the per-operation deadline.
///
/// A connection-class failure drops the context, so later calls report
/// `NotConnected` until the next connect.
struct ModbusSession {
    context: Option<ModbusContext>,
    deadline: Duration,
}

impl ModbusSession {
    fn new(deadline: Duration) -> Self {
        Self {
            context: None,
            deadline,
        }
    }

    fn attach(&mut self, context: ModbusContext) {
        self.context = Some(context);
    }

    /// Returns `true` if a context was open.
    async fn detach(&mut self) -> bool {
        let Some(mut ctx) = self.context.take() else {
            return false;
        };
        if let Err(e) = ctx.disconnect().await {
            tracing::warn!(error = %e, "Error while closing Modbus session");
        }
        true
    }

    fn is_attached(&self) -> bool {
        self.context.is_some()
    }

    fn context(&mut self) -> ModbusResult<&mut ModbusContext> {
        self.context.as_mut().ok_or_else(ModbusError::not_connected)
    }

    async fn read_bits(&mut self, kind: RegisterKind, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        let deadline = self.deadline;
        let ctx = self.context()?;
        let reply = match kind {
            RegisterKind::Coil => timeout(deadline, ctx.read_coils(address, count)).await,
            _ => timeout(deadline, ctx.read_discrete_inputs(address, count)).await,
        };
        self.settle(reply, read_function_code(kind), TimeoutError::read)
    }

    async fn read_words(&mut self, kind: RegisterKind, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        let deadline = self.deadline;
        let ctx = self.context()?;
        let reply = match kind {
            RegisterKind::HoldingRegister => timeout(deadline, ctx.read_holding_registers(address, count)).await,
            _ => timeout(deadline, ctx.read_input_registers(address, count)).await,
        };
        self.settle(reply, read_function_code(kind), TimeoutError::read)
    }

    async fn write_coil(&mut self, address: u16, value: bool) -> ModbusResult<()> {
        let deadline = self.deadline;
        let reply = timeout(deadline, self.context()?.write_single_coil(address, value)).await;
        self.settle(reply, FC_WRITE_COIL, TimeoutError::write)
    }

    async fn write_word(&mut self, address: u16, value: u16) -> ModbusResult<()> {
        let deadline = self.deadline;
        let reply = timeout(deadline, self.context()?.write_single_register(address, value)).await;
        self.settle(reply, FC_WRITE_WORD, TimeoutError::write)
    }

    async fn write_words(&mut self, address: u16, values: &[u16]) -> ModbusResult<()> {
        let deadline = self.deadline;
        let reply = timeout(deadline, self.context()?.write_multiple_registers(address, values)).await;
        self.settle(reply, FC_WRITE_WORDS, TimeoutError::write)
    }

    fn settle<T>(
        &mut self,
        reply: Reply<T>,
        function_code: u8,
        timed_out: fn(Duration) -> TimeoutError,
    ) -> ModbusResult<T> {
        let result = match reply {
            Err(_) => Err(ModbusError::timeout(timed_out(self.deadline))),
            Ok(Err(TokioModbusError::Transport(e))) if e.kind() == io::ErrorKind::TimedOut => {
                Err(ModbusError::timeout(timed_out(self.deadline)))
            }
            Ok(Err(TokioModbusError::Transport(e))) => {
                Err(ModbusError::connection(ConnectionError::from_io(e)))
            }
            Ok(Err(TokioModbusError::Protocol(e))) => {
                Err(ModbusError::protocol(ProtocolError::unexpected(format!("{:?}", e))))
            }
            Ok(Ok(Err(code))) => Err(ModbusError::exception(function_code, exception_byte(code))),
            Ok(Ok(Ok(value))) => Ok(value),
        };

        if let Err(e) = &result {
            if e.is_link_loss() {
                tracing::warn!(function_code, error = %e, "Modbus session lost");
                self.context = None;
            }
        }
        result
    }
}

fn exception_byte(code: ExceptionCode) -> u8 {
    match code {
        ExceptionCode::IllegalFunction => 0x01,
        ExceptionCode::IllegalDataAddress => 0x02,
        ExceptionCode::IllegalDataValue => 0x03,
        ExceptionCode::ServerDeviceFailure => 0x04,
        ExceptionCode::Acknowledge => 0x05,
        ExceptionCode::ServerDeviceBusy => 0x06,
        ExceptionCode::MemoryParityError => 0x08,
        ExceptionCode::GatewayPathUnavailable => 0x0A,
        ExceptionCode::GatewayTargetDevice => 0x0B,
        _ => 0xFF,
    }
}
