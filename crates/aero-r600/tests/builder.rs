use aero_r600::isa::tex;
use aero_r600::{
    disasm, sel, AluDst, AluInstr, AluSrc, Bytecode, CfBlock, CfOp, ChipClass, ChipFamily,
    CompileError, ExportType, Output, TexInstr,
};
use pretty_assertions::assert_eq;

const FAMILIES: [ChipFamily; 4] = [
    ChipFamily::Rv610,
    ChipFamily::Rv740,
    ChipFamily::Redwood,
    ChipFamily::Cayman,
];

/// Terminates the program the way each class expects.
fn finish(bc: &mut Bytecode, mut out: Output) -> Result<(), CompileError> {
    out.op = CfOp::ExportDone;
    if bc.class() == ChipClass::Cayman {
        bc.add_output(out)?;
        bc.add_cfinst(CfOp::End)?;
    } else {
        out.end_of_program = true;
        bc.add_output(out)?;
    }
    Ok(())
}

fn round_trip(bc: &mut Bytecode) -> Vec<CfBlock> {
    let class = bc.class();
    let words = bc.build().unwrap().to_vec();
    disasm::decode(class, &words).unwrap()
}

#[test]
fn blocks_survive_encode_and_decode_on_every_class() {
    for family in FAMILIES {
        let mut bc = Bytecode::new(family).unwrap();
        let ops = bc.alu_opcodes();

        let add = AluInstr::op2(ops.add)
            .src(0, AluSrc::gpr(1, 2).negate())
            .src(1, AluSrc::literal(1))
            .dst(AluDst::gpr(2, 0));
        let mul = AluInstr::op2(ops.mul)
            .src(0, AluSrc::gpr(1, 1))
            .src(1, AluSrc::inline(sel::SRC_0_5))
            .dst(AluDst::gpr(2, 1))
            .last(true);
        bc.add_alu(add.clone()).unwrap();
        bc.add_alu(mul.clone()).unwrap();
        bc.add_literal(&[0x4000_0000, 0x4040_0000, 0, 0]).unwrap();

        let sample = TexInstr {
            inst: tex::SAMPLE,
            resource_id: 1,
            sampler_id: 1,
            src_gpr: 2,
            src_sel: [0, 1, 2, 3],
            dst_gpr: 3,
            dst_sel: [0, 1, 2, 3],
            coord_type: [true; 4],
            ..TexInstr::default()
        };
        bc.add_tex(sample).unwrap();
        finish(&mut bc, Output::new(ExportType::Pixel, 0, 3)).unwrap();

        let blocks = round_trip(&mut bc);
        let expected = if family == ChipFamily::Cayman {
            vec![CfOp::Alu, CfOp::Tex, CfOp::ExportDone, CfOp::End]
        } else {
            vec![CfOp::Alu, CfOp::Tex, CfOp::ExportDone]
        };
        let kinds: Vec<CfOp> = blocks.iter().map(|cf| cf.op).collect();
        assert_eq!(kinds, expected, "{family}");

        let alu = blocks[0].alu();
        assert_eq!(blocks[0].ndw, 6, "{family}");
        assert_eq!(alu.len(), 2);
        for (decoded, built) in alu.iter().zip([&add, &mul]) {
            assert_eq!(decoded.inst, built.inst, "{family}");
            assert_eq!(decoded.src[0], built.src[0], "{family}");
            assert_eq!(decoded.src[1], built.src[1], "{family}");
            assert_eq!(decoded.dst, built.dst, "{family}");
            assert_eq!(decoded.last, built.last, "{family}");
        }
        assert_eq!(alu[1].literals(), &[0x4000_0000, 0x4040_0000][..]);

        assert_eq!(blocks[1].tex(), &[sample][..], "{family}");

        let export = blocks[2].output().unwrap();
        assert_eq!(export.gpr, 3);
        assert_eq!(export.export_type, ExportType::Pixel);
        assert_eq!(export.end_of_program, family != ChipFamily::Cayman);
    }
}

#[test]
fn each_block_holds_one_instruction_kind() {
    let mut bc = Bytecode::new(ChipFamily::Rv770).unwrap();
    let mov = bc.alu_opcodes().mov;
    let alu = |dst| {
        AluInstr::op2(mov)
            .src(0, AluSrc::gpr(0, 0))
            .dst(AluDst::gpr(dst, 0))
            .last(true)
    };
    bc.add_alu(alu(1)).unwrap();
    bc.add_tex(TexInstr::default()).unwrap();
    bc.add_alu(alu(2)).unwrap();
    bc.add_alu(alu(3)).unwrap();
    bc.add_tex(TexInstr::default()).unwrap();
    bc.add_tex(TexInstr::default()).unwrap();
    finish(&mut bc, Output::new(ExportType::Pixel, 0, 1)).unwrap();

    let blocks = round_trip(&mut bc);
    let shape: Vec<(CfOp, u32)> = blocks[..4].iter().map(|cf| (cf.op, cf.ndw)).collect();
    assert_eq!(
        shape,
        [(CfOp::Alu, 2), (CfOp::Tex, 4), (CfOp::Alu, 4), (CfOp::Tex, 8)]
    );
    assert_eq!(blocks[4].op, CfOp::ExportDone);
    // Clause bodies follow the CF headers in block order.
    let addrs: Vec<u32> = blocks.iter().filter_map(|cf| cf.addr).collect();
    assert!(addrs.windows(2).all(|w| w[0] < w[1]), "{addrs:?}");
    assert!(addrs[0] >= 2 * blocks.len() as u32);
}

#[test]
fn control_flow_targets_survive_decode() {
    for family in FAMILIES {
        let mut bc = Bytecode::new(family).unwrap();
        let mov = bc.alu_opcodes().mov;
        bc.open_loop().unwrap();
        bc.open_if(AluSrc::gpr(1, 0), 2, &[0; 4]).unwrap();
        bc.emit_break_or_continue(CfOp::LoopBreak).unwrap();
        bc.close_if().unwrap();
        bc.add_alu(
            AluInstr::op2(mov)
                .src(0, AluSrc::gpr(1, 0))
                .dst(AluDst::gpr(1, 1))
                .last(true),
        )
        .unwrap();
        bc.close_loop().unwrap();
        finish(&mut bc, Output::new(ExportType::Pixel, 0, 1)).unwrap();

        let built: Vec<(CfOp, u32, u32)> = bc
            .blocks()
            .iter()
            .map(|cf| (cf.op, cf.cf_addr, cf.pop_count))
            .collect();
        let decoded: Vec<(CfOp, u32, u32)> = round_trip(&mut bc)
            .iter()
            .map(|cf| (cf.op, cf.cf_addr, cf.pop_count))
            .collect();
        assert_eq!(decoded, built, "{family}");
        assert!(bc.nstack() > 0);
    }
}

#[test]
fn truncated_input_is_malformed() {
    let mut bc = Bytecode::new(ChipFamily::Rv770).unwrap();
    finish(&mut bc, Output::new(ExportType::Pixel, 0, 0)).unwrap();
    let words = bc.build().unwrap().to_vec();
    assert!(matches!(
        disasm::decode(ChipClass::R700, &words[..1]),
        Err(CompileError::MalformedBytecode { offset: 0, .. })
    ));
}
