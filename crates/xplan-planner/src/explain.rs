//! Human-readable rendering of execution plans.

use std::fmt;

use crate::physical::ExecutionPlan;

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, f, 0)
    }
}

fn render(plan: &ExecutionPlan, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    writeln!(
        f,
        "{pad}ExecutionPlan cost={:.3} strategy={:?} conversions={}",
        plan.total_cost(),
        plan.strategy(),
        plan.conversion_count()
    )?;
    for stage in plan.stages() {
        let deps: Vec<String> = stage.depends_on.iter().map(|d| d.to_string()).collect();
        writeln!(
            f,
            "{pad}  {} on {} after [{}]",
            stage.id,
            stage.platform,
            deps.join(", ")
        )?;
        for id in &stage.operators {
            let Some(op) = plan.operator(*id) else {
                continue;
            };
            let covers: Vec<String> = op.covers.iter().map(|c| c.to_string()).collect();
            writeln!(
                f,
                "{pad}    {id} {} ({:?}) covers=[{}] cost={:.3}",
                op.name,
                op.role,
                covers.join(", "),
                plan.operator_cost(*id).unwrap_or(0.0)
            )?;
            if let Some(body) = plan.loop_body(*id) {
                render(body, f, depth + 3)?;
            }
        }
    }
    for ch in plan.channels() {
        writeln!(
            f,
            "{pad}  {}: {}.{} -> {}.{} {} ~{}",
            ch.id, ch.producer.op, ch.producer.slot, ch.consumer.op, ch.consumer.slot, ch.descriptor, ch.cardinality
        )?;
    }
    Ok(())
}
