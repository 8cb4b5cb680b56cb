//! Lua sandbox creation
//!
//! Pipeline definitions are plain data, so the sandbox only exposes the
//! table, string and math libraries plus the `pipeline` helper module.
//! No I/O, OS, package loading or debug access is available.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table};

/// Create a restricted Lua sandbox for evaluating pipeline definitions
///
/// # Example
/// ```no_run
/// use sluice_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let definition: mlua::Table = lua
///     .load(r#"return pipeline.define { name = "main-ci", stages = {} }"#)
///     .eval()?;
/// let name: String = definition.get("name")?;
/// assert_eq!(name, "main-ci");
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::default(),
    )?;

    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;
    lua.globals().set("load", mlua::Nil)?;

    register_pipeline_module(&lua)?;

    Ok(lua)
}

/// Register the `pipeline` helper module
///
/// `define`, `stage` and `task` return their table unchanged; the trigger
/// helpers build the tagged tables the parser expects.
fn register_pipeline_module(lua: &Lua) -> LuaResult<()> {
    let pipeline = lua.create_table()?;

    let passthrough = |lua: &Lua| lua.create_function(|_, definition: Table| Ok(definition));
    pipeline.set("define", passthrough(lua)?)?;
    pipeline.set("stage", passthrough(lua)?)?;
    pipeline.set("task", passthrough(lua)?)?;

    // pipeline.schedule("0 0 2 * * *")
    let schedule_fn = lua.create_function(|lua, cron: String| {
        let trigger = lua.create_table()?;
        trigger.set("kind", "scheduled")?;
        trigger.set("cron", cron)?;
        Ok(trigger)
    })?;
    pipeline.set("schedule", schedule_fn)?;

    // pipeline.on_push("main")
    let push_fn = lua.create_function(|lua, branch: String| {
        let trigger = lua.create_table()?;
        trigger.set("kind", "branch_push")?;
        trigger.set("branch", branch)?;
        Ok(trigger)
    })?;
    pipeline.set("on_push", push_fn)?;

    // pipeline.after("data-collection")
    let after_fn = lua.create_function(|lua, upstream: String| {
        let trigger = lua.create_table()?;
        trigger.set("kind", "upstream_completion")?;
        trigger.set("pipeline", upstream)?;
        Ok(trigger)
    })?;
    pipeline.set("after", after_fn)?;

    let manual_fn = lua.create_function(|lua, ()| {
        let trigger = lua.create_table()?;
        trigger.set("kind", "manual")?;
        Ok(trigger)
    })?;
    pipeline.set("manual", manual_fn)?;

    // pipeline.secret("COSMOS-DB-KEY") - a reference by name, never a value
    let secret_fn = lua.create_function(|lua, name: String| {
        let secret = lua.create_table()?;
        secret.set("secret", name)?;
        Ok(secret)
    })?;
    pipeline.set("secret", secret_fn)?;

    lua.globals().set("pipeline", pipeline)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_and_os_are_unavailable() {
        let lua = create_sandbox().unwrap();
        let io: mlua::Value = lua.globals().get("io").unwrap();
        let os: mlua::Value = lua.globals().get("os").unwrap();
        let require: mlua::Value = lua.globals().get("require").unwrap();
        assert!(io.is_nil());
        assert!(os.is_nil());
        assert!(require.is_nil());
    }

    #[test]
    fn test_trigger_helpers() {
        let lua = create_sandbox().unwrap();
        let trigger: Table = lua.load(r#"return pipeline.after("analysis")"#).eval().unwrap();
        let kind: String = trigger.get("kind").unwrap();
        let upstream: String = trigger.get("pipeline").unwrap();
        assert_eq!(kind, "upstream_completion");
        assert_eq!(upstream, "analysis");
    }
}
