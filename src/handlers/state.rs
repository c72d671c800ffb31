use super::templates::{Interpolated, Template, TemplateContext};
use super::{Handler, HandlerError};
use crate::dispatcher::EventScope;
use crate::event::Event;
use crate::state::StateOp;
use async_trait::async_trait;

struct CompiledOp {
    op: StateOp,
    operand: Interpolated,
}

/// Applies state operations in order; operands are interpolated first
pub struct StateHandler {
    ops: Vec<CompiledOp>,
}

impl StateHandler {
    pub fn new(ops: Vec<StateOp>) -> Result<Self, HandlerError> {
        let ops = ops
            .into_iter()
            .map(|op| {
                let operand = Interpolated::parse(op.value().unwrap_or_default())?;
                Ok(CompiledOp { op, operand })
            })
            .collect::<Result<_, HandlerError>>()?;
        Ok(Self { ops })
    }
}

#[async_trait]
impl Handler for StateHandler {
    async fn handle(&self, event: &Event, scope: &mut EventScope) -> Result<(), HandlerError> {
        let resolved = {
            let ctx = TemplateContext::new(event, scope);
            self.ops
                .iter()
                .map(|c| c.op.try_map_value(|_| c.operand.format(&ctx)))
                .collect::<Result<Vec<_>, _>>()?
        };

        let state = scope.state_mut().ok_or(HandlerError::StateUnavailable)?;
        for op in &resolved {
            op.apply(state)?;
        }
        tracing::debug!(chat_id = %event.chat_id, ops = resolved.len(), "Applied state operations");
        Ok(())
    }
}
